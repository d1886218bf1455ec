//! Shared test doubles for the integration suite: in-memory transports
//! that stand in for a real socket, so two endpoints (or a client and a
//! server) can be pumped against each other inside one process.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;

use relaynet::transport::{HandshakeTransport, Transport};

/// A `Transport` that queues everything `transmit` hands it and records
/// every payload `process_payload` delivers. Tests drain `outbox` and feed
/// it to a peer endpoint's `receive` to simulate the wire.
#[derive(Default, Clone)]
pub struct QueueTransport {
    pub outbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
    pub delivered: Rc<RefCell<Vec<Vec<u8>>>>,
    pub accept: Rc<RefCell<bool>>,
}

impl QueueTransport {
    pub fn new() -> Self {
        QueueTransport { accept: Rc::new(RefCell::new(true)), ..Default::default() }
    }

    pub fn drain_outbox(&self) -> Vec<Vec<u8>> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.delivered.borrow().clone()
    }
}

impl Transport for QueueTransport {
    fn transmit(&mut self, _endpoint_id: u64, _sequence: u64, bytes: &[u8]) {
        self.outbox.borrow_mut().push_back(bytes.to_vec());
    }

    fn process_payload(&mut self, _endpoint_id: u64, _sequence: u64, bytes: &[u8]) -> bool {
        self.delivered.borrow_mut().push(bytes.to_vec());
        *self.accept.borrow()
    }
}

/// A `HandshakeTransport` that records every `(addr, bytes)` it's asked to
/// send, for tests driving `handshake::Client`/`handshake::Server` against
/// each other without a real socket.
#[derive(Default, Clone)]
pub struct RoutingTransport {
    pub sent: Rc<RefCell<VecDeque<(SocketAddr, Vec<u8>)>>>,
}

impl RoutingTransport {
    pub fn new() -> Self {
        RoutingTransport::default()
    }

    pub fn drain(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.sent.borrow_mut().drain(..).collect()
    }
}

impl HandshakeTransport for RoutingTransport {
    fn send_to(&mut self, addr: SocketAddr, bytes: &[u8]) {
        self.sent.borrow_mut().push_back((addr, bytes.to_vec()));
    }
}

pub fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
}
