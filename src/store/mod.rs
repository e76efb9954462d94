pub mod encoding;
pub mod entry;
pub mod persist;
pub mod pubsub;

use bytes::BytesMut;
use itertools::Itertools;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::transaction::Transaction;
use encoding::{Codec, Stored};
use entry::{is_truthy, strict_eq, Entry};
use pubsub::{Message, Registry};

/// The Store owns the keyspace together with its expiration table, the pub/sub registry and the
/// value codec. Keys with a TTL are removed by a background task once their deadline elapses.
/// The store is cheap to clone; every clone refers to the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<InnerStore>,
}

impl Store {
    pub fn new() -> Store {
        let state = State {
            entries: HashMap::new(),
            expirations: HashMap::new(),
            deadlines: BTreeSet::new(),
            generation: 0,
            subscribers: Registry::default(),
            codec: Codec::new(),
        };

        let waker = Notify::new();
        let inner = Arc::new(InnerStore {
            state: Mutex::new(state),
            waker,
        });

        tokio::spawn({
            let inner = inner.clone();
            async move { remove_expired_keys(inner).await }
        });

        Self { inner }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InnerStore {
    state: Mutex<State>,
    waker: Notify,
}

pub struct InnerStoreLocked<'a> {
    state: MutexGuard<'a, State>,
    waker: &'a Notify,
}

impl<'a> InnerStoreLocked<'a> {
    pub fn set(&mut self, key: &str, value: &Value) -> Value {
        let stored = self.state.codec.encode(value);
        self.state
            .entries
            .insert(key.to_string(), Entry::Scalar(stored));
        Value::from("OK")
    }

    /// Decoded value of `key`, or null when it is missing.
    pub fn get(&self, key: &str) -> Value {
        let state = &*self.state;
        state
            .entries
            .get(key)
            .map(|entry| entry.render(&state.codec))
            .unwrap_or(Value::Null)
    }

    pub fn del(&mut self, key: &str) -> i64 {
        self.state.entries.remove(key).is_some() as i64
    }

    pub fn exists(&self, key: &str) -> bool {
        self.state.entries.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.state.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.state.entries.keys()
    }

    /// Schedules `key` for deletion after `ttl`. Returns 0 when the key does not exist. A later
    /// call for the same key supersedes the pending one.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> i64 {
        if !self.exists(key) {
            return 0;
        }

        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let at_ms = now_ms().saturating_add(ttl_ms);
        match Instant::now().checked_add(ttl) {
            Some(deadline) => self.schedule_expiration(key, at_ms, deadline),
            None => {
                // Beyond what the clock can represent, so the key never expires.
                debug!(key, "expiration out of range, key kept without a deadline");
                self.state.expirations.remove(key);
            }
        }
        1
    }

    fn schedule_expiration(&mut self, key: &str, at_ms: u64, deadline: Instant) {
        self.state.generation += 1;
        let generation = self.state.generation;

        self.state
            .expirations
            .insert(key.to_string(), Expiration { at_ms, generation });
        self.state
            .deadlines
            .insert((deadline, key.to_string(), generation));

        let next_to_expire = self.state.deadlines.iter().next().map(|(_, _, g)| *g);
        if next_to_expire == Some(generation) {
            self.waker.notify_one();
        }
    }

    pub fn lpush(&mut self, key: &str, values: &[Value]) -> i64 {
        let encoded = self.encode_all(values);
        let list = self.healed(key, empty_list, as_list);
        for value in encoded {
            list.push_front(value);
        }
        list.len() as i64
    }

    pub fn rpush(&mut self, key: &str, values: &[Value]) -> i64 {
        let encoded = self.encode_all(values);
        let list = self.healed(key, empty_list, as_list);
        list.extend(encoded);
        list.len() as i64
    }

    /// Removes and returns the head of the list. A popped value that decodes to something falsy
    /// is reported as null, the same as an empty list.
    pub fn lpop(&mut self, key: &str) -> Value {
        self.pop(key, VecDeque::pop_front)
    }

    pub fn rpop(&mut self, key: &str) -> Value {
        self.pop(key, VecDeque::pop_back)
    }

    fn pop(&mut self, key: &str, pop: fn(&mut VecDeque<Stored>) -> Option<Stored>) -> Value {
        let state = &mut *self.state;
        let Some(Entry::List(list)) = state.entries.get_mut(key) else {
            return Value::Null;
        };

        match pop(list).map(|stored| state.codec.decode(&stored)) {
            Some(value) if is_truthy(&value) => value,
            _ => Value::Null,
        }
    }

    /// Keeps the elements between `start` and `stop` inclusive. Negative indexes count from the
    /// end of the list.
    pub fn ltrim(&mut self, key: &str, start: i64, stop: i64) -> Value {
        if self.exists(key) {
            let list = self.healed(key, empty_list, as_list);
            match resolve_range(list.len(), start, stop) {
                Some((start, stop)) => {
                    let kept: VecDeque<Stored> = list.drain(start..=stop).collect();
                    *list = kept;
                }
                None => list.clear(),
            }
        }
        Value::from("OK")
    }

    pub fn sadd(&mut self, key: &str, members: &[Value]) -> i64 {
        let set = self.healed(key, empty_set, as_set);
        let mut added = 0;
        for member in members {
            if !set.iter().any(|m| strict_eq(m, member)) {
                set.push(member.clone());
                added += 1;
            }
        }
        added
    }

    pub fn srem(&mut self, key: &str, members: &[Value]) -> i64 {
        let Some(Entry::Set(set)) = self.state.entries.get_mut(key) else {
            return 0;
        };

        let mut removed = 0;
        for member in members {
            if let Some(pos) = set.iter().position(|m| strict_eq(m, member)) {
                set.remove(pos);
                removed += 1;
            }
        }
        removed
    }

    pub fn smembers(&self, key: &str) -> Value {
        match self.state.entries.get(key) {
            Some(Entry::Set(set)) => Value::Array(set.clone()),
            _ => Value::Array(vec![]),
        }
    }

    /// Returns 1 if `field` is new in the hash, 0 if it was updated.
    pub fn hset(&mut self, key: &str, field: &str, value: &Value) -> i64 {
        let stored = self.state.codec.encode(value);
        let hash = self.healed(key, empty_hash, as_hash);
        hash.insert(field.to_string(), stored).is_none() as i64
    }

    pub fn hget(&self, key: &str, field: &str) -> Value {
        let state = &*self.state;
        match state.entries.get(key) {
            Some(Entry::Hash(hash)) => hash
                .get(field)
                .map(|stored| state.codec.decode(stored))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    pub fn hgetall(&self, key: &str) -> Value {
        let state = &*self.state;
        match state.entries.get(key) {
            Some(entry @ Entry::Hash(_)) => entry.render(&state.codec),
            _ => Value::Object(Map::new()),
        }
    }

    /// Returns 1 if `member` is new in the sorted set, 0 if its score was updated.
    pub fn zadd(&mut self, key: &str, score: &Value, member: &str) -> i64 {
        let stored = self.state.codec.encode(score);
        let zset = self.healed(key, empty_sorted_set, as_sorted_set);
        zset.insert(member.to_string(), stored).is_none() as i64
    }

    /// Members between `start` and `stop` by ascending score. Scores are decoded on every call.
    /// With scores the result is flattened as `[member, score, member, score, ...]`.
    pub fn zrange(&self, key: &str, start: i64, stop: i64, with_scores: bool) -> Value {
        let state = &*self.state;
        let Some(Entry::SortedSet(zset)) = state.entries.get(key) else {
            return Value::Array(vec![]);
        };

        let sorted = zset
            .iter()
            .map(|(member, score)| (member, state.codec.decode(score)))
            .sorted_by(|(a_member, a_score), (b_member, b_score)| {
                let a = a_score.as_f64().unwrap_or(f64::NAN);
                let b = b_score.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b).then_with(|| a_member.cmp(b_member))
            })
            .collect::<Vec<_>>();

        let Some((start, stop)) = resolve_range(sorted.len(), start, stop) else {
            return Value::Array(vec![]);
        };

        let window = sorted.into_iter().skip(start).take(stop - start + 1);
        let result: Vec<Value> = if with_scores {
            window
                .flat_map(|(member, score)| [Value::from(member.as_str()), score])
                .collect()
        } else {
            window
                .map(|(member, _)| Value::from(member.as_str()))
                .collect()
        };
        Value::Array(result)
    }

    /// Sets the bit at `offset` and returns its previous value. Bit 0 is the most significant bit
    /// of the first byte.
    pub fn setbit(&mut self, key: &str, offset: usize, bit: bool) -> i64 {
        let bitmap = self.healed(key, empty_bitmap, as_bitmap);
        let (byte, mask) = (offset / 8, 0x80u8 >> (offset % 8));
        if bitmap.len() <= byte {
            bitmap.resize(byte + 1, 0);
        }

        let previous = bitmap[byte] & mask != 0;
        if bit {
            bitmap[byte] |= mask;
        } else {
            bitmap[byte] &= !mask;
        }
        previous as i64
    }

    pub fn getbit(&self, key: &str, offset: usize) -> i64 {
        match self.state.entries.get(key) {
            Some(Entry::Bitmap(bitmap)) => bitmap
                .get(offset / 8)
                .map(|byte| (byte & (0x80u8 >> (offset % 8)) != 0) as i64)
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Byte length of a string or bitmap value, 0 for anything else.
    pub fn strlen(&self, key: &str) -> i64 {
        match self.state.entries.get(key) {
            Some(Entry::Scalar(stored)) => match self.state.codec.decode(stored) {
                Value::String(s) => s.len() as i64,
                _ => 0,
            },
            Some(Entry::Bitmap(bitmap)) => bitmap.len() as i64,
            _ => 0,
        }
    }

    /// Appends a point and re-sorts the whole series by timestamp.
    pub fn set_time_series(&mut self, key: &str, timestamp: Number, value: &Value) -> Value {
        let stored = self.state.codec.encode(value);
        let series = self.healed(key, empty_time_series, as_time_series);
        series.push((timestamp, stored));
        series.sort_by(|(a, _), (b, _)| timestamp_of(a).total_cmp(&timestamp_of(b)));
        Value::from("OK")
    }

    /// Points with a timestamp in `[start, end]`, as `[timestamp, value]` pairs.
    pub fn get_time_series(&self, key: &str, start: f64, end: f64) -> Value {
        let state = &*self.state;
        let Some(Entry::TimeSeries(series)) = state.entries.get(key) else {
            return Value::Array(vec![]);
        };

        series
            .iter()
            .filter(|(ts, _)| (start..=end).contains(&timestamp_of(ts)))
            .map(|(ts, stored)| {
                Value::Array(vec![Value::Number(ts.clone()), state.codec.decode(stored)])
            })
            .collect()
    }

    pub fn publish(&self, channel: &str, message: &Value) -> i64 {
        self.state.subscribers.publish(channel, message) as i64
    }

    pub fn subscribe(&mut self, channel: &str, id: Uuid, sender: UnboundedSender<Message>) {
        self.state.subscribers.subscribe(channel, id, sender);
    }

    pub fn unsubscribe(&mut self, channel: &str, id: Uuid) -> bool {
        self.state.subscribers.unsubscribe(channel, id)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.state.subscribers.subscriber_count(channel)
    }

    pub fn multi(&self) -> Transaction {
        Transaction::new()
    }

    /// Starts a transaction watching `keys`, snapshotting their current decoded values.
    pub fn watch(&self, keys: &[String]) -> Transaction {
        let mut transaction = Transaction::new();
        transaction.watch(self, keys);
        transaction
    }

    pub fn remove_expired_keys(&mut self) -> Option<Instant> {
        let now = Instant::now();

        let expired: Vec<(Instant, String, u64)> = self
            .state
            .deadlines
            .iter()
            .take_while(|(deadline, _, _)| deadline <= &now)
            .cloned()
            .collect();

        for entry in expired {
            let (_, key, generation) = &entry;
            let current = self.state.expirations.get(key).map(|e| e.generation);
            if current == Some(*generation) {
                debug!(key = key.as_str(), "key expired");
                self.state.entries.remove(key);
                self.state.expirations.remove(key);
            }
            self.state.deadlines.remove(&entry);
        }

        self.state
            .deadlines
            .iter()
            .next()
            .map(|&(deadline, _, _)| deadline)
    }

    fn encode_all(&mut self, values: &[Value]) -> Vec<Stored> {
        values.iter().map(|v| self.state.codec.encode(v)).collect()
    }

    /// Returns the container stored at `key`, creating it when missing. A key holding a
    /// different type is replaced by an empty container of the requested one.
    fn healed<T>(
        &mut self,
        key: &str,
        empty: fn() -> Entry,
        project: fn(&mut Entry) -> Option<&mut T>,
    ) -> &mut T {
        let entry = self
            .state
            .entries
            .entry(key.to_string())
            .or_insert_with(empty);

        if project(entry).is_none() {
            debug!(key, previous = %entry, "replacing value of the wrong type");
            *entry = empty();
        }

        project(entry).expect("entry was just reset to the requested type")
    }
}

impl Deref for Store {
    type Target = InnerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl InnerStore {
    pub fn lock(&self) -> InnerStoreLocked<'_> {
        let state = self.state.lock().unwrap();
        InnerStoreLocked {
            state,
            waker: &self.waker,
        }
    }
}

type Key = String;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Expiration {
    /// Absolute expiry time in milliseconds since the Unix epoch.
    at_ms: u64,
    generation: u64,
}

pub struct State {
    entries: HashMap<Key, Entry>,
    expirations: HashMap<Key, Expiration>,
    deadlines: BTreeSet<(Instant, Key, u64)>,
    generation: u64,
    subscribers: Registry,
    codec: Codec,
}

fn empty_list() -> Entry {
    Entry::List(VecDeque::new())
}

fn empty_set() -> Entry {
    Entry::Set(Vec::new())
}

fn empty_hash() -> Entry {
    Entry::Hash(HashMap::new())
}

fn empty_sorted_set() -> Entry {
    Entry::SortedSet(HashMap::new())
}

fn empty_time_series() -> Entry {
    Entry::TimeSeries(Vec::new())
}

fn empty_bitmap() -> Entry {
    Entry::Bitmap(BytesMut::new())
}

fn as_list(entry: &mut Entry) -> Option<&mut VecDeque<Stored>> {
    match entry {
        Entry::List(list) => Some(list),
        _ => None,
    }
}

fn as_set(entry: &mut Entry) -> Option<&mut Vec<Value>> {
    match entry {
        Entry::Set(set) => Some(set),
        _ => None,
    }
}

fn as_hash(entry: &mut Entry) -> Option<&mut HashMap<String, Stored>> {
    match entry {
        Entry::Hash(hash) => Some(hash),
        _ => None,
    }
}

fn as_sorted_set(entry: &mut Entry) -> Option<&mut HashMap<String, Stored>> {
    match entry {
        Entry::SortedSet(zset) => Some(zset),
        _ => None,
    }
}

fn as_time_series(entry: &mut Entry) -> Option<&mut Vec<(Number, Stored)>> {
    match entry {
        Entry::TimeSeries(series) => Some(series),
        _ => None,
    }
}

fn as_bitmap(entry: &mut Entry) -> Option<&mut BytesMut> {
    match entry {
        Entry::Bitmap(bitmap) => Some(bitmap),
        _ => None,
    }
}

fn timestamp_of(number: &Number) -> f64 {
    number.as_f64().unwrap_or(f64::NAN)
}

/// Clamps a Redis style inclusive `[start, stop]` range to a sequence of `len` elements.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

async fn remove_expired_keys(store: Arc<InnerStore>) {
    loop {
        let (next_expiration, waker) = {
            let mut store = store.lock();
            let next_expiration = store.remove_expired_keys();
            (next_expiration, store.waker)
        };

        if let Some(next_expiration) = next_expiration {
            tokio::select! {
                _ = sleep_until(next_expiration) => {}
                _ = waker.notified() => {}
            }
        } else {
            waker.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time;

    #[tokio::test]
    async fn get_missing_key_is_null() {
        let store = Store::new();
        assert_eq!(store.lock().get("nope"), Value::Null);
    }

    #[tokio::test]
    async fn set_get_del() {
        let store = Store::new();
        let mut state = store.lock();

        assert_eq!(state.set("k", &json!("v")), json!("OK"));
        assert_eq!(state.get("k"), json!("v"));
        assert_eq!(state.del("k"), 1);
        assert_eq!(state.del("k"), 0);
        assert_eq!(state.get("k"), Value::Null);
    }

    #[tokio::test]
    async fn ttl() {
        time::pause();

        let store = Store::new();

        {
            let mut store = store.lock();
            store.set("key1", &json!("value1"));
            store.set("key2", &json!("value2"));
            assert_eq!(store.expire("key1", Duration::from_secs(10)), 1);
            assert_eq!(store.expire("key2", Duration::from_secs(20)), 1);
            assert_eq!(store.expire("missing", Duration::from_secs(20)), 0);
        }

        assert_eq!(store.lock().keys().count(), 2);

        time::advance(Duration::from_secs(10)).await;
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(store.lock().keys().count(), 1);
        assert!(store.lock().exists("key2"));

        time::advance(Duration::from_secs(20)).await;
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.lock().keys().count(), 0);
    }

    #[tokio::test]
    async fn latest_expire_wins() {
        time::pause();

        let store = Store::new();
        {
            let mut store = store.lock();
            store.set("k", &json!(1));
            store.expire("k", Duration::from_secs(1));
            store.expire("k", Duration::from_secs(5));
        }

        time::advance(Duration::from_secs(2)).await;
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.lock().get("k"), json!(1));

        time::advance(Duration::from_secs(4)).await;
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.lock().get("k"), Value::Null);
    }

    #[tokio::test]
    async fn unrepresentable_ttl_keeps_the_key() {
        time::pause();

        let store = Store::new();
        {
            let mut store = store.lock();
            store.set("k", &json!(1));
            store.expire("k", Duration::from_secs(1));
            assert_eq!(store.expire("k", Duration::MAX), 1);
        }

        time::advance(Duration::from_secs(2)).await;
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.lock().get("k"), json!(1));
    }

    #[tokio::test]
    async fn shorter_expire_replaces_longer_one() {
        time::pause();

        let store = Store::new();
        {
            let mut store = store.lock();
            store.set("k", &json!(1));
            store.expire("k", Duration::from_secs(10));
            store.expire("k", Duration::from_secs(1));
        }

        time::advance(Duration::from_secs(2)).await;
        time::sleep(Duration::from_millis(1)).await;
        assert!(!store.lock().exists("k"));
    }

    #[tokio::test]
    async fn list_push_and_pop() {
        let store = Store::new();
        let mut state = store.lock();

        assert_eq!(state.lpush("L", &[json!("b"), json!("a")]), 2);
        assert_eq!(state.rpush("L", &[json!("c")]), 3);
        assert_eq!(state.get("L"), json!(["a", "b", "c"]));

        assert_eq!(state.lpop("L"), json!("a"));
        assert_eq!(state.rpop("L"), json!("c"));
        assert_eq!(state.get("L"), json!(["b"]));
    }

    #[tokio::test]
    async fn pop_reports_falsy_values_as_null() {
        let store = Store::new();
        let mut state = store.lock();

        state.rpush("L", &[json!(0), json!(""), json!(false), json!("x")]);
        assert_eq!(state.lpop("L"), Value::Null);
        assert_eq!(state.lpop("L"), Value::Null);
        assert_eq!(state.lpop("L"), Value::Null);
        assert_eq!(state.lpop("L"), json!("x"));
        assert_eq!(state.lpop("L"), Value::Null);
        assert_eq!(state.rpop("missing"), Value::Null);
    }

    #[tokio::test]
    async fn ltrim() {
        let store = Store::new();
        let mut state = store.lock();

        state.rpush("L", &[json!(1), json!(2), json!(3), json!(4), json!(5)]);
        state.ltrim("L", 1, -2);
        assert_eq!(state.get("L"), json!([2, 3, 4]));

        state.ltrim("L", 5, 10);
        assert_eq!(state.get("L"), json!([]));

        state.ltrim("missing", 0, 1);
        assert!(!state.exists("missing"));
    }

    #[tokio::test]
    async fn wrong_type_is_replaced_on_write() {
        let store = Store::new();
        let mut state = store.lock();

        state.rpush("x", &[json!("a")]);
        assert_eq!(state.sadd("x", &[json!("m")]), 1);
        assert_eq!(state.get("x"), json!(["m"]));

        assert_eq!(state.hset("x", "f", &json!(1)), 1);
        assert_eq!(state.hgetall("x"), json!({"f": 1}));

        state.set("x", &json!("scalar"));
        assert_eq!(state.rpush("x", &[json!(1)]), 1);
        assert_eq!(state.get("x"), json!([1]));
    }

    #[tokio::test]
    async fn wrong_type_reads_are_empty() {
        let store = Store::new();
        let mut state = store.lock();

        state.set("s", &json!("v"));
        assert_eq!(state.lpop("s"), Value::Null);
        assert_eq!(state.smembers("s"), json!([]));
        assert_eq!(state.srem("s", &[json!("v")]), 0);
        assert_eq!(state.hget("s", "f"), Value::Null);
        assert_eq!(state.hgetall("s"), json!({}));
        assert_eq!(state.zrange("s", 0, -1, false), json!([]));
        assert_eq!(state.getbit("s", 0), 0);
        assert_eq!(state.get_time_series("s", 0.0, 10.0), json!([]));
        assert_eq!(state.get("s"), json!("v"));
    }

    #[tokio::test]
    async fn sets_use_strict_equality() {
        let store = Store::new();
        let mut state = store.lock();

        assert_eq!(state.sadd("s", &[json!("a"), json!("a"), json!(1)]), 2);
        assert_eq!(state.sadd("s", &[json!({"o": 1}), json!({"o": 1})]), 2);
        assert_eq!(state.srem("s", &[json!({"o": 1})]), 0);
        assert_eq!(state.srem("s", &[json!("a"), json!("z")]), 1);
        assert_eq!(state.smembers("s"), json!([1, {"o": 1}, {"o": 1}]));
    }

    #[tokio::test]
    async fn hashes() {
        let store = Store::new();
        let mut state = store.lock();

        assert_eq!(state.hset("h", "name", &json!("redos")), 1);
        assert_eq!(state.hset("h", "name", &json!("other")), 0);
        assert_eq!(state.hset("h", "version", &json!(2)), 1);
        assert_eq!(state.hget("h", "name"), json!("other"));
        assert_eq!(state.hget("h", "missing"), Value::Null);
        assert_eq!(state.hgetall("h"), json!({"name": "other", "version": 2}));
        assert_eq!(state.hgetall("missing"), json!({}));
    }

    #[tokio::test]
    async fn sorted_sets() {
        let store = Store::new();
        let mut state = store.lock();

        assert_eq!(state.zadd("z", &json!(3), "c"), 1);
        assert_eq!(state.zadd("z", &json!(1), "a"), 1);
        assert_eq!(state.zadd("z", &json!(2), "b"), 1);
        assert_eq!(state.zadd("z", &json!(0.5), "c"), 0);

        assert_eq!(state.zrange("z", 0, -1, false), json!(["c", "a", "b"]));
        assert_eq!(state.zrange("z", 1, 1, false), json!(["a"]));
        assert_eq!(
            state.zrange("z", 0, -1, true),
            json!(["c", 0.5, "a", 1, "b", 2])
        );
        assert_eq!(state.zrange("z", 5, 10, false), json!([]));
    }

    #[tokio::test]
    async fn bitmaps() {
        let store = Store::new();
        let mut state = store.lock();

        assert_eq!(state.setbit("b", 7, true), 0);
        assert_eq!(state.setbit("b", 7, true), 1);
        assert_eq!(state.getbit("b", 7), 1);
        assert_eq!(state.getbit("b", 6), 0);
        assert_eq!(state.getbit("b", 100), 0);
        assert_eq!(state.strlen("b"), 1);

        assert_eq!(state.setbit("b", 17, true), 0);
        assert_eq!(state.strlen("b"), 3);
        assert_eq!(state.get("b"), json!([1, 0, 64]));

        assert_eq!(state.setbit("b", 7, false), 1);
        assert_eq!(state.getbit("b", 7), 0);
    }

    #[tokio::test]
    async fn strlen() {
        let store = Store::new();
        let mut state = store.lock();

        state.set("short", &json!("hello"));
        state.set("long", &json!("x".repeat(100)));
        state.set("number", &json!(12));

        assert_eq!(state.strlen("short"), 5);
        assert_eq!(state.strlen("long"), 100);
        assert_eq!(state.strlen("number"), 0);
        assert_eq!(state.strlen("missing"), 0);
    }

    #[tokio::test]
    async fn time_series_stays_sorted() {
        let store = Store::new();
        let mut state = store.lock();

        state.set_time_series("t", Number::from(5), &json!("b"));
        state.set_time_series("t", Number::from(1), &json!("a"));
        state.set_time_series("t", Number::from(20), &json!("c"));

        assert_eq!(
            state.get_time_series("t", 0.0, 10.0),
            json!([[1, "a"], [5, "b"]])
        );
        assert_eq!(state.get_time_series("t", 5.0, 20.0), json!([[5, "b"], [20, "c"]]));
        assert_eq!(state.get_time_series("missing", 0.0, 10.0), json!([]));
    }

    #[tokio::test]
    async fn publish_to_subscribers() {
        let store = Store::new();
        let mut state = store.lock();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        assert_eq!(state.publish("c", &json!("nobody")), 0);

        state.subscribe("c", id, tx);
        assert_eq!(state.publish("c", &json!("hi")), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            Message {
                channel: "c".to_string(),
                payload: json!("hi")
            }
        );

        assert!(state.unsubscribe("c", id));
        assert_eq!(state.subscriber_count("c"), 0);
    }

    #[test]
    fn ranges() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 1, 100), Some((1, 4)));
        assert_eq!(resolve_range(5, -100, 1), Some((0, 1)));
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }
}
