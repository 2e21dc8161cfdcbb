use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::warn;

use crate::bus::{Envelope, Transport};
use crate::error::BusError;

/// In-process broadcast medium for peers living on one thread.
///
/// Each port owns a queue; posting pushes the JSON-encoded envelope onto
/// every other open port, so delivery order and loss mirror a real
/// broadcast channel: nothing is delivered until the receiver drains.
#[derive(Clone, Default)]
pub struct LocalHub {
    queues: Rc<RefCell<Vec<Option<VecDeque<String>>>>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(&self) -> HubPort {
        let mut qs = self.queues.borrow_mut();
        qs.push(Some(VecDeque::new()));
        HubPort {
            hub: self.clone(),
            index: qs.len() - 1,
        }
    }

    /// Total undelivered envelopes across open ports.
    pub fn in_flight(&self) -> usize {
        self.queues.borrow().iter().flatten().map(VecDeque::len).sum()
    }
}

pub struct HubPort {
    hub: LocalHub,
    index: usize,
}

impl HubPort {
    /// Takes every envelope queued for this port, oldest first.
    pub fn drain(&self) -> Vec<Envelope> {
        let raw: Vec<String> = match self.hub.queues.borrow_mut().get_mut(self.index) {
            Some(Some(q)) => q.drain(..).collect(),
            _ => return Vec::new(),
        };
        raw.iter()
            .filter_map(|s| match Envelope::from_json(s) {
                Ok(env) => Some(env),
                Err(e) => {
                    warn!("hub: dropping undecodable envelope: {e}");
                    None
                }
            })
            .collect()
    }

    /// Detaches the port; queued and future envelopes are lost.
    pub fn close(&self) {
        if let Some(slot) = self.hub.queues.borrow_mut().get_mut(self.index) {
            *slot = None;
        }
    }
}

impl Transport for HubPort {
    fn post(&self, envelope: &Envelope) -> Result<(), BusError> {
        let json = envelope.to_json()?;
        let mut qs = self.hub.queues.borrow_mut();
        if qs.get(self.index).is_none_or(Option::is_none) {
            return Err(BusError::Transport("port is closed".into()));
        }
        for (i, q) in qs.iter_mut().enumerate() {
            if i != self.index
                && let Some(q) = q
            {
                q.push_back(json.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MessageKind, Target};

    #[test]
    fn broadcast_skips_sender_and_closed_ports() {
        let hub = LocalHub::new();
        let a = hub.port();
        let b = hub.port();
        let c = hub.port();
        c.close();
        let env = Envelope::new(MessageKind::WindowUpdate, Target::All, &7).unwrap();
        a.post(&env).unwrap();
        assert!(a.drain().is_empty());
        assert_eq!(b.drain(), vec![env.clone()]);
        assert!(c.drain().is_empty());
        assert!(c.post(&env).is_err());
        assert_eq!(hub.in_flight(), 0);
    }
}
