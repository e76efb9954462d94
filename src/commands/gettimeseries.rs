use serde_json::Value;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::store::Store;
use crate::Error;

/// Points whose timestamp lies in `[start, end]`, as `[timestamp, value]` pairs.
#[derive(Debug, PartialEq)]
pub struct GetTimeSeries {
    pub key: String,
    pub start: f64,
    pub end: f64,
}

impl Executable for GetTimeSeries {
    fn exec(self, store: &Store) -> Result<Value, Error> {
        let store = store.lock();
        Ok(store.get_time_series(&self.key, self.start, self.end))
    }
}

impl TryFrom<&mut CommandParser> for GetTimeSeries {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let start = parser.next_f64()?;
        let end = parser.next_f64()?;

        Ok(Self { key, start, end })
    }
}
