use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use super::error::Result;
use super::key::CacheKey;

type FlightResult<N> = Result<Arc<Vec<N>>>;

/// Deduplicates concurrent fetches for the same cache key.
///
/// The first caller for a key becomes the flight lead and runs the fetch;
/// everyone else subscribes to the lead's broadcast channel and receives
/// the same outcome. Registration is a single check-and-insert under one
/// lock, so two concurrent callers can never both become lead.
pub struct InflightRegistry<N> {
    flights: Arc<Mutex<HashMap<CacheKey, broadcast::Sender<FlightResult<N>>>>>,
}

impl<N> Clone for InflightRegistry<N> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<N> Default for InflightRegistry<N> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// What a caller got back from [`InflightRegistry::ticket`].
pub enum FlightTicket<N> {
    /// No flight was registered; this caller fetches and must resolve the
    /// flight through [`FlightLead::finish`].
    Lead(FlightLead<N>),
    /// A flight already exists; await its broadcast outcome.
    Join(broadcast::Receiver<FlightResult<N>>),
}

/// RAII handle held by the fetching caller. Dropping it without calling
/// [`FlightLead::finish`] (cancellation, panic) unregisters the flight so
/// waiters see a closed channel instead of hanging.
pub struct FlightLead<N> {
    registry: InflightRegistry<N>,
    key: CacheKey,
    tx: Option<broadcast::Sender<FlightResult<N>>>,
}

impl<N: Clone> InflightRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register for `key`: lead if nobody is fetching it, join otherwise.
    pub fn ticket(&self, key: &CacheKey) -> FlightTicket<N> {
        let mut flights = self.flights.lock();
        if let Some(tx) = flights.get(key) {
            return FlightTicket::Join(tx.subscribe());
        }
        let (tx, _rx) = broadcast::channel(1);
        flights.insert(key.clone(), tx.clone());
        FlightTicket::Lead(FlightLead {
            registry: self.clone(),
            key: key.clone(),
            tx: Some(tx),
        })
    }

    /// Number of fetches currently in flight.
    pub fn active(&self) -> usize {
        self.flights.lock().len()
    }
}

impl<N: Clone> FlightLead<N> {
    /// Unregister the flight and broadcast its outcome to every waiter.
    ///
    /// Removal happens before the send: a caller arriving in between
    /// starts a fresh fetch rather than subscribing to a resolved
    /// channel it could never hear from.
    pub fn finish(mut self, outcome: FlightResult<N>) {
        self.registry.flights.lock().remove(&self.key);
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

impl<N> Drop for FlightLead<N> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            self.registry.flights.lock().remove(&self.key);
            debug!("In-flight fetch abandoned for key: {}", self.key);
        }
    }
}
