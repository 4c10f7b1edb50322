//! The connected-client table: assigns `ClientId`s to accepted TCP sockets and
//! indexes `Client` by that id for the I/O front-end's readiness loop.

use std::collections::HashMap;
use std::net::TcpStream;

use crate::client::{Client, ClientId};

#[derive(Default)]
pub struct ClientTable {
    clients: HashMap<ClientId, Client>,
    next_id: u64,
}

impl ClientTable {
    pub fn new() -> ClientTable {
        ClientTable { clients: HashMap::new(), next_id: 0 }
    }

    pub fn insert(&mut self, socket: TcpStream) -> ClientId {
        let id = ClientId::new(self.next_id);
        self.next_id += 1;
        self.clients.insert(id, Client::new(id, socket));
        id
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> TcpStream {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(client);
        server
    }

    #[test]
    fn assigns_distinct_ids() {
        let mut table = ClientTable::new();
        let a = table.insert(loopback());
        let b = table.insert(loopback());
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_drops_the_client() {
        let mut table = ClientTable::new();
        let id = table.insert(loopback());
        assert!(table.remove(id).is_some());
        assert!(table.get(id).is_none());
        assert!(table.is_empty());
    }
}
