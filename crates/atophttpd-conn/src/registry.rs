use crate::{ConnError, ConnectionType, Result};

/// Fixed-capacity, case-insensitive lookup from connection type name to
/// implementation, mirroring the source's small static array of
/// registered connection types rather than an open-ended `HashMap`
/// (SPEC_FULL.md §4.5: capacity 8).
pub struct ConnRegistry {
    entries: Vec<Box<dyn ConnectionType>>,
}

const CAPACITY: usize = 8;

impl ConnRegistry {
    pub fn new() -> Self {
        ConnRegistry {
            entries: Vec::with_capacity(CAPACITY),
        }
    }

    /// Registers `conn_type`, calling its `init` hook once. Fails if
    /// the registry is already at capacity.
    pub fn register(&mut self, conn_type: Box<dyn ConnectionType>) -> Result<()> {
        if self.entries.len() >= CAPACITY {
            return Err(ConnError::RegistryFull(CAPACITY));
        }
        conn_type.init()?;
        self.entries.push(conn_type);
        Ok(())
    }

    /// Looks up a connection type by name, case-insensitively. Unlike
    /// the source's `get_conntype_index_by_name` (which returns `-1`
    /// on a miss and relies on every caller checking it), a miss here
    /// is a typed error the compiler forces callers to handle.
    pub fn get(&self, name: &str) -> Result<&dyn ConnectionType> {
        self.entries
            .iter()
            .find(|c| c.get_type().eq_ignore_ascii_case(name))
            .map(|c| c.as_ref())
            .ok_or_else(|| ConnError::UnknownType(name.to_string()))
    }
}

impl Default for ConnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::RawFd;

    struct Stub(&'static str);

    impl ConnectionType for Stub {
        fn get_type(&self) -> &'static str {
            self.0
        }
        fn conn_create(&self) -> Result<RawFd> {
            unimplemented!()
        }
        fn listen(&self, _fd: RawFd, _addr: &str, _port: u16) -> Result<()> {
            unimplemented!()
        }
        fn accept(&self, _listener: RawFd) -> Result<Box<dyn crate::Connection>> {
            unimplemented!()
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut reg = ConnRegistry::new();
        reg.register(Box::new(Stub("TCP"))).unwrap();
        assert_eq!(reg.get("tcp").unwrap().get_type(), "TCP");
        assert_eq!(reg.get("TCP").unwrap().get_type(), "TCP");
    }

    #[test]
    fn unknown_name_is_a_typed_error() {
        let reg = ConnRegistry::new();
        assert!(matches!(reg.get("tls"), Err(ConnError::UnknownType(_))));
    }

    #[test]
    fn registry_rejects_past_capacity() {
        let mut reg = ConnRegistry::new();
        for i in 0..CAPACITY {
            reg.register(Box::new(Stub(Box::leak(
                i.to_string().into_boxed_str(),
            ))))
            .unwrap();
        }
        let err = reg.register(Box::new(Stub("overflow"))).unwrap_err();
        assert!(matches!(err, ConnError::RegistryFull(CAPACITY)));
    }
}
