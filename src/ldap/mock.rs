//! Scripted in-memory directory. MUST NEVER be used in production.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::session::{Connection, Connector, SearchScope};
use super::{DirectoryConfig, DirectoryEntry, DirectoryError, Result};

const INVALID_CREDENTIALS: u32 = 49;
const NO_SUCH_OBJECT: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(usize),
    Bind(usize, String),
    Search(usize, String, SearchScope, String),
    Unbind(usize),
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, String>,
    entries: HashMap<String, Vec<DirectoryEntry>>,
    base_entries: HashMap<String, DirectoryEntry>,
    unreachable: bool,
    failing_search: bool,
    failing_unbind: bool,
    hanging_bind: bool,
    calls: Vec<Call>,
    closed: Vec<usize>,
    abandoned: usize,
    connections: usize,
}

/// Directory answering from fixed accounts and entries.
#[derive(Clone, Default)]
pub struct MockDirectory {
    inner: Arc<Mutex<Inner>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(self, f: impl FnOnce(&mut Inner)) -> Self {
        f(&mut self.inner.lock().unwrap());
        self
    }

    /// Accept binds as `dn` with `password`.
    pub fn with_account(self, dn: &str, password: &str) -> Self {
        self.with(|i| {
            i.accounts.insert(dn.to_owned(), password.to_owned());
        })
    }

    /// Answer subtree searches using exactly `filter`.
    pub fn with_entry(self, filter: &str, entry: DirectoryEntry) -> Self {
        self.with(|i| i.entries.entry(filter.to_owned()).or_default().push(entry))
    }

    /// Answer base searches on `dn`.
    pub fn with_base_entry(self, dn: &str, entry: DirectoryEntry) -> Self {
        self.with(|i| {
            i.base_entries.insert(dn.to_owned(), entry);
        })
    }

    pub fn unreachable(self) -> Self {
        self.with(|i| i.unreachable = true)
    }

    pub fn failing_search(self) -> Self {
        self.with(|i| i.failing_search = true)
    }

    pub fn failing_unbind(self) -> Self {
        self.with(|i| i.failing_unbind = true)
    }

    /// Binds are recorded and then never answered.
    pub fn hanging_bind(self) -> Self {
        self.with(|i| i.hanging_bind = true)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn connections(&self) -> usize {
        self.inner.lock().unwrap().connections
    }

    pub fn open_connections(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.connections - inner.closed.len()
    }

    pub fn abandoned(&self) -> usize {
        self.inner.lock().unwrap().abandoned
    }

    pub fn unbinds(&self, conn: usize) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Unbind(conn))
            .count()
    }

    pub fn bind_dns(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Bind(_, dn) => Some(dn),
                _ => None,
            })
            .collect()
    }

    pub fn binds_as(&self, dn: &str) -> usize {
        self.bind_dns().iter().filter(|d| *d == dn).count()
    }

    pub fn search_filters(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Search(_, _, _, filter) => Some(filter),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Connector for MockDirectory {
    async fn connect(
        &self,
        _config: &DirectoryConfig,
    ) -> Result<Box<dyn Connection>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unreachable {
            return Err(DirectoryError::Unavailable(
                "connection refused".into(),
            ));
        }

        let id = inner.connections;
        inner.connections += 1;
        inner.calls.push(Call::Connect(id));

        Ok(Box::new(MockConnection {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MockConnection {
    id: usize,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let outcome = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Bind(self.id, dn.to_owned()));

            if inner.hanging_bind {
                None
            } else {
                Some(match inner.accounts.get(dn) {
                    Some(expected) if expected == password => Ok(()),
                    _ => Err(DirectoryError::Operation {
                        code: INVALID_CREDENTIALS,
                        message: "invalidCredentials".into(),
                    }),
                })
            }
        };

        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Search(
            self.id,
            base.to_owned(),
            scope,
            filter.to_owned(),
        ));

        if inner.failing_search {
            return Err(DirectoryError::Unavailable("connection reset".into()));
        }

        match scope {
            SearchScope::Subtree => {
                Ok(inner.entries.get(filter).cloned().unwrap_or_default())
            },
            SearchScope::Base => match inner.base_entries.get(base) {
                Some(entry) => Ok(vec![entry.clone()]),
                None => Err(DirectoryError::Operation {
                    code: NO_SUCH_OBJECT,
                    message: "noSuchObject".into(),
                }),
            },
        }
    }

    async fn unbind(&mut self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Unbind(self.id));
        inner.closed.push(self.id);

        if inner.failing_unbind {
            Err(DirectoryError::Unavailable("broken pipe".into()))
        } else {
            Ok(())
        }
    }

    fn abandon(self: Box<Self>) {
        let mut inner = self.inner.lock().unwrap();
        inner.abandoned += 1;
        inner.closed.push(self.id);
    }
}
