//! The client registry: every authenticated (and in-flight,
//! pre-authentication) session is tracked in one map behind one mutex.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use lazy_static::lazy_static;
use regex::Regex;

use crate::consts;
use crate::protocol::Msg;

lazy_static! {
    /// Nicknames must start with a letter and may continue with letters,
    /// digits and a short set of punctuation, up to `MAX_NICKNAME_LEN`
    /// characters total.
    static ref NICKNAME_RE: Regex = Regex::new(&format!(
        r"^[A-Za-z][A-Za-z0-9!@#$%&]{{1,{}}}$",
        consts::MAX_NICKNAME_LEN - 1
    ))
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitError {
    CapacityExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NickError {
    Invalid,
    Taken,
}

struct Entry {
    nickname: Option<String>,
    outbox: Sender<Msg>,
}

/// Tracks every live session by an opaque integer id assigned at admit
/// time. Thread id or socket fd are both unsuitable as stable keys once
/// a thread exits, so the registry mints its own ids.
pub struct Registry {
    inner: Mutex<Inner>,
}

struct Inner {
    sessions: HashMap<u64, Entry>,
    next_id: u64,
    max_connections: usize,
}

impl Registry {
    pub fn new(max_connections: usize) -> Registry {
        Registry {
            inner: Mutex::new(Inner { sessions: HashMap::new(), next_id: 1, max_connections }),
        }
    }

    /// Admits a newly-accepted, not-yet-authenticated session. Returns the
    /// id the session must use for every later registry call.
    pub fn admit(&self, outbox: Sender<Msg>) -> Result<u64, AdmitError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.sessions.len() >= inner.max_connections {
            return Err(AdmitError::CapacityExceeded);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.sessions.insert(id, Entry { nickname: None, outbox });
        Ok(id)
    }

    /// Validates and claims `nickname` for `id`. Comparison is exact and
    /// case-sensitive.
    pub fn set_nickname(&self, id: u64, nickname: &str) -> Result<(), NickError> {
        if !NICKNAME_RE.is_match(nickname) {
            return Err(NickError::Invalid);
        }
        let mut inner = self.inner.lock().unwrap();
        let taken = inner.sessions.values().any(|e| e.nickname.as_deref() == Some(nickname));
        if taken {
            return Err(NickError::Taken);
        }
        if let Some(entry) = inner.sessions.get_mut(&id) {
            entry.nickname = Some(nickname.to_string());
        }
        Ok(())
    }

    pub fn nickname_of(&self, id: u64) -> Option<String> {
        self.inner.lock().unwrap().sessions.get(&id).and_then(|e| e.nickname.clone())
    }

    pub fn remove(&self, id: u64) {
        self.inner.lock().unwrap().sessions.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    /// Delivers `msg` to every authenticated session's outbox, including
    /// the sender's own: broadcasts are sender-inclusive by design, not
    /// filtered. A send failure means that session's thread has already
    /// exited and is mid-`remove`; it is swallowed rather than retried.
    pub fn broadcast(&self, msg: &Msg) {
        let inner = self.inner.lock().unwrap();
        for entry in inner.sessions.values() {
            if entry.nickname.is_some() {
                let _ = entry.outbox.send(msg.clone());
            }
        }
    }

    /// Supports `/list`: collects every authenticated nickname, in no
    /// particular order.
    pub fn authenticated_nicknames(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.sessions.values().filter_map(|e| e.nickname.clone()).collect()
    }
}
