use serde_json::Value;

use crate::store::Store;
use crate::Error;

pub trait Executable {
    fn exec(self, store: &Store) -> Result<Value, Error>;
}
