// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Track the append-only table of entry names and their log connections.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::sink::LogConnection;

/// Append-only map from entry name to its log connection.
///
/// Entries are never removed. Every read and the check-then-insert in
/// [`ConnectionRegistry::get_or_try_insert_with`] run under the same lock.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<String, Arc<dyn LogConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn LogConnection>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the connection registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn LogConnection>> {
        self.entries().get(name).cloned()
    }

    /// Snapshot of every registered name, in no particular order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true when nothing has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Return the connection for `name`, opening it with `open` on first use.
    ///
    /// The lock is held across `open`, so racing callers for the same new
    /// name observe a single connection. A failed `open` leaves no entry.
    pub fn get_or_try_insert_with<E, F>(
        &self,
        name: &str,
        open: F,
    ) -> Result<Arc<dyn LogConnection>, E>
    where
        F: FnOnce() -> Result<Arc<dyn LogConnection>, E>,
    {
        let mut entries = self.entries();
        if let Some(existing) = entries.get(name) {
            return Ok(Arc::clone(existing));
        }
        let connection = open()?;
        entries.insert(name.to_owned(), Arc::clone(&connection));
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use syslog_wire::Severity;

    #[derive(Debug)]
    struct Quiet(Severity);

    impl LogConnection for Quiet {
        fn severity(&self) -> Severity {
            self.0
        }

        fn label(&self) -> &str {
            "quiet"
        }

        fn send(&self, _payload: &[u8]) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[test]
    fn insert_happens_once_per_name() {
        let registry = ConnectionRegistry::new();
        let mut opened = 0;
        let first = registry
            .get_or_try_insert_with::<SinkError, _>("a.stdout", || {
                opened += 1;
                let connection: Arc<dyn LogConnection> = Arc::new(Quiet(Severity::Informational));
                Ok(connection)
            })
            .expect("first insert");
        let second = registry
            .get_or_try_insert_with::<SinkError, _>("a.stdout", || {
                opened += 1;
                let connection: Arc<dyn LogConnection> = Arc::new(Quiet(Severity::Error));
                Ok(connection)
            })
            .expect("second lookup");
        assert_eq!(opened, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.severity(), Severity::Informational);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failed_open_leaves_no_entry() {
        let registry = ConnectionRegistry::new();
        let result = registry.get_or_try_insert_with("down.stderr", || {
            Err::<Arc<dyn LogConnection>, _>(SinkError::NoLocalSocket)
        });
        assert!(result.is_err());
        assert!(registry.is_empty());
        assert!(registry.get("down.stderr").is_none());
    }
}
