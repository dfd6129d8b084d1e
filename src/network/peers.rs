use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    addr: String,
}

impl Peer {
    fn new(addr: String) -> Peer {
        Peer { addr }
    }

    pub fn get_addr(&self) -> &str {
        self.addr.as_str()
    }
}

/// Known peer addresses, shared between the server and the TCP transport
#[derive(Debug, Default)]
pub struct Peers {
    inner: RwLock<Vec<Peer>>,
}

impl Peers {
    pub fn new() -> Peers {
        Peers::default()
    }

    pub fn from_addrs<I: IntoIterator<Item = String>>(addrs: I) -> Peers {
        let peers = Peers::new();
        for addr in addrs {
            peers.add_peer(addr);
        }
        peers
    }

    /// Returns false if the address was already known
    pub fn add_peer(&self, addr: String) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.iter().any(|p| p.get_addr() == addr) {
            return false;
        }
        inner.push(Peer::new(addr));
        true
    }

    pub fn evict_peer(&self, addr: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.retain(|p| p.get_addr() != addr);
    }

    pub fn get_peers(&self) -> Vec<Peer> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let peers = Peers::new();
        assert!(peers.add_peer("127.0.0.1:2002".to_string()));
        assert!(!peers.add_peer("127.0.0.1:2002".to_string()));
        assert_eq!(peers.len(), 1);
        assert_eq!(peers.get_peers()[0].get_addr(), "127.0.0.1:2002");
    }

    #[test]
    fn test_evict() {
        let peers = Peers::from_addrs(vec!["a:1".to_string(), "b:2".to_string()]);
        peers.evict_peer("a:1");
        let remaining = peers.get_peers();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].get_addr(), "b:2");
    }
}
