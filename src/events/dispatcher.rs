// Event dispatcher - multiplexes the event sources and applies decoded events
//
// Each source cycles through idle (waiting), readable (payload returned by
// `recv`), decoding (`decode`) and dispatching (`dispatch` per event). Decode
// and dispatch are synchronous, so a shutdown can only be observed between
// payloads and never drops events that were already decoded.

use futures::future::{self, FutureExt};
use std::future::Future;

use super::{Category, EventSource, NetworkEvent};
use crate::error::{MonitorError, SourceError};
use crate::report::{Report, ReportSink};
use crate::routes::cache::RouteCache;
use crate::routes::invalidation::InvalidationEngine;

/// Counters kept by the dispatcher, logged on shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub payloads: u64,
    pub events: u64,
    pub decode_failures: u64,
    pub receive_failures: u64,
    pub invalidations: u64,
}

pub struct Dispatcher<S, R> {
    sources: Vec<S>,
    cache: RouteCache,
    sink: R,
    stats: DispatchStats,
}

impl<S, R> Dispatcher<S, R>
where
    S: EventSource,
    R: ReportSink,
{
    pub fn new(sources: Vec<S>, cache: RouteCache, sink: R) -> Self {
        Dispatcher {
            sources,
            cache,
            sink,
            stats: DispatchStats::default(),
        }
    }

    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Categories of the sources still open, in subscription order.
    pub fn categories(&self) -> Vec<Category> {
        self.sources.iter().map(EventSource::category).collect()
    }

    /// Run until `shutdown` resolves, every source has closed, or a source's
    /// readiness wait fails.
    ///
    /// Each wake-up handles the source that woke the loop and then gives every
    /// other source that is already readable one turn, so a busy source
    /// cannot starve the rest. Shutdown is checked before the sources on every
    /// iteration.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        while !self.sources.is_empty() {
            let (woken, outcome) = {
                let waits = self
                    .sources
                    .iter_mut()
                    .enumerate()
                    .map(|(index, source)| Box::pin(async move { (index, source.recv().await) }));

                tokio::select! {
                    biased;

                    _ = &mut shutdown => {
                        tracing::info!("Shutdown requested, stopping event loop");
                        return Ok(());
                    }
                    (ready, _, _) = future::select_all(waits) => ready,
                }
            };

            let mut closed = Vec::new();
            if self.handle(woken, outcome)? {
                closed.push(woken);
            }

            for index in 0..self.sources.len() {
                if index == woken {
                    continue;
                }
                if let Some(outcome) = self.sources[index].recv().now_or_never() {
                    if self.handle(index, outcome)? {
                        closed.push(index);
                    }
                }
            }

            closed.sort_unstable();
            for index in closed.into_iter().rev() {
                self.sources.remove(index);
            }
        }

        tracing::info!("All event sources closed");
        Ok(())
    }

    /// Returns `true` when the source at `index` has closed.
    fn handle(
        &mut self,
        index: usize,
        outcome: Result<Option<Vec<u8>>, SourceError>,
    ) -> Result<bool, MonitorError> {
        let category = self.sources[index].category();

        match outcome {
            Ok(Some(payload)) => {
                self.process_payload(index, &payload);
                Ok(false)
            }
            Ok(None) => {
                tracing::info!("{} event source closed", category);
                Ok(true)
            }
            Err(e) => {
                let error = MonitorError::from_source(category, e);
                if error.is_fatal() {
                    return Err(error);
                }
                self.stats.receive_failures += 1;
                tracing::warn!("{}", error);
                Ok(false)
            }
        }
    }

    fn process_payload(&mut self, index: usize, payload: &[u8]) {
        self.stats.payloads += 1;
        let category = self.sources[index].category();

        match self.sources[index].decode(payload) {
            Ok(events) => {
                tracing::trace!("{} payload carried {} event(s)", category, events.len());
                for event in events {
                    self.dispatch(event);
                }
            }
            Err(e) => {
                self.stats.decode_failures += 1;
                tracing::warn!("Failed to decode {} payload: {}", category, e);
            }
        }
    }

    /// Apply one decoded event to the cache and report it.
    pub fn dispatch(&mut self, event: NetworkEvent) {
        self.stats.events += 1;

        match event {
            NetworkEvent::RouteAdded(route) => {
                self.sink.report(Report::RouteAdded {
                    route: route.clone(),
                });
                self.cache.insert(route);
            }
            NetworkEvent::RouteChanged(route) => {
                self.sink.report(Report::RouteChanged {
                    route: route.clone(),
                });
                self.cache.insert(route);
            }
            NetworkEvent::RouteDeleted(route) => {
                if self
                    .cache
                    .remove(&route.destination, route.interface_index)
                    .is_none()
                {
                    tracing::debug!("Deleted route {} was not cached", route.destination);
                }
                self.sink.report(Report::RouteDeleted { route });
            }
            NetworkEvent::LinkAdded {
                interface_index,
                name,
            } => {
                self.sink.report(Report::LinkAdded {
                    interface_index,
                    name,
                });
            }
            NetworkEvent::LinkDeleted {
                interface_index,
                name,
            } => {
                self.sink.report(Report::LinkDeleted {
                    interface_index,
                    name,
                });
                let sink = &mut self.sink;
                let count = InvalidationEngine::new(&self.cache)
                    .on_link_removed(interface_index, |invalidation| sink.report(invalidation.into()));
                self.stats.invalidations += count as u64;
            }
            NetworkEvent::AddressDeleted {
                interface_index,
                address,
            } => {
                self.sink.report(Report::AddressDeleted {
                    interface_index,
                    address,
                });
                let sink = &mut self.sink;
                let count = InvalidationEngine::new(&self.cache).on_address_removed(
                    interface_index,
                    address,
                    |invalidation| sink.report(invalidation.into()),
                );
                self.stats.invalidations += count as u64;
            }
            NetworkEvent::AddressAdded {
                interface_index,
                address,
            } => {
                tracing::trace!("Ignoring address {} added on interface {}", address, interface_index);
            }
        }
    }
}
