/// Recording connector used by the cache and router tests
use crate::core::connection::{Connector, NodeConnection};
use crate::error::{RouterError, RouterResult};
use crate::redis::resp::RespValue;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything the mock saw, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect { address: String },
    Authenticate { address: String, password: String },
    Select { address: String, index: u32 },
    Execute { address: String, command: String, args: Vec<Bytes> },
}

impl Event {
    pub fn address(&self) -> &str {
        match self {
            Event::Connect { address }
            | Event::Authenticate { address, .. }
            | Event::Select { address, .. }
            | Event::Execute { address, .. } => address,
        }
    }
}

#[derive(Default)]
struct MockState {
    events: Mutex<Vec<Event>>,
    refused_ports: Mutex<HashSet<u16>>,
    rejected_commands: Mutex<HashSet<String>>,
    rejected_passwords: Mutex<HashSet<String>>,
    connect_delays: Mutex<HashMap<u16, Duration>>,
    broken_ports: Mutex<HashSet<u16>>,
    broken: AtomicBool,
}

/// Connector whose connections reply with the address that served them
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.events.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Connect { address } => Some(address),
                _ => None,
            })
            .collect()
    }

    /// Events recorded for one node, in order
    pub fn events_for(&self, address: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| event.address() == address)
            .collect()
    }

    /// Address that served the last execution of `command`
    pub fn served_by(&self, command: &str) -> Option<String> {
        self.events().into_iter().rev().find_map(|event| match event {
            Event::Execute {
                address,
                command: executed,
                ..
            } if executed == command => Some(address),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.state.events.lock().unwrap().clear();
    }

    pub fn refuse_port(&self, port: u16) {
        self.state.refused_ports.lock().unwrap().insert(port);
    }

    pub fn accept_port(&self, port: u16) {
        self.state.refused_ports.lock().unwrap().remove(&port);
    }

    pub fn reject_command(&self, command: &str) {
        self.state
            .rejected_commands
            .lock()
            .unwrap()
            .insert(command.to_string());
    }

    pub fn reject_password(&self, password: &str) {
        self.state
            .rejected_passwords
            .lock()
            .unwrap()
            .insert(password.to_string());
    }

    /// Make every established connection fail at the I/O level
    pub fn set_broken(&self, broken: bool) {
        self.state.broken.store(broken, Ordering::SeqCst);
    }

    /// Break only the connections to one port
    pub fn break_port(&self, port: u16) {
        self.state.broken_ports.lock().unwrap().insert(port);
    }

    pub fn repair_port(&self, port: u16) {
        self.state.broken_ports.lock().unwrap().remove(&port);
    }

    /// Make connecting to `port` take `delay`
    pub fn delay_port(&self, port: u16, delay: Duration) {
        self.state.connect_delays.lock().unwrap().insert(port, delay);
    }

    fn record(&self, event: Event) {
        self.state.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, host: &str, port: u16) -> RouterResult<MockConnection> {
        let address = format!("{}:{}", host, port);

        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;

        let delay = self.state.connect_delays.lock().unwrap().get(&port).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.refused_ports.lock().unwrap().contains(&port) {
            return Err(RouterError::connection_failed(address, "connection refused"));
        }

        self.record(Event::Connect {
            address: address.clone(),
        });

        Ok(MockConnection {
            address,
            port,
            connector: self.clone(),
        })
    }
}

pub struct MockConnection {
    address: String,
    port: u16,
    connector: MockConnector,
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("address", &self.address)
            .finish()
    }
}

impl MockConnection {
    fn check_broken(&self) -> RouterResult<()> {
        let port_broken = self
            .connector
            .state
            .broken_ports
            .lock()
            .unwrap()
            .contains(&self.port);
        if port_broken || self.connector.state.broken.load(Ordering::SeqCst) {
            return Err(RouterError::Network(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} went away", self.address),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeConnection for MockConnection {
    async fn authenticate(&mut self, password: &str) -> RouterResult<()> {
        self.check_broken()?;
        self.connector.record(Event::Authenticate {
            address: self.address.clone(),
            password: password.to_string(),
        });

        if self
            .connector
            .state
            .rejected_passwords
            .lock()
            .unwrap()
            .contains(password)
        {
            return Err(RouterError::node("AUTH", "WRONGPASS invalid password"));
        }
        Ok(())
    }

    async fn select_database(&mut self, index: u32) -> RouterResult<()> {
        self.check_broken()?;
        self.connector.record(Event::Select {
            address: self.address.clone(),
            index,
        });
        Ok(())
    }

    async fn execute(&mut self, command: &str, args: &[Bytes]) -> RouterResult<RespValue> {
        self.check_broken()?;
        self.connector.record(Event::Execute {
            address: self.address.clone(),
            command: command.to_string(),
            args: args.to_vec(),
        });

        if self
            .connector
            .state
            .rejected_commands
            .lock()
            .unwrap()
            .contains(command)
        {
            return Err(RouterError::node(command, "ERR rejected by mock"));
        }

        Ok(RespValue::bulk(self.address.clone()))
    }
}
