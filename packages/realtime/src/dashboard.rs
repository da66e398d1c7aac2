//! A role dashboard: a filtered subscription feeding a [`LocalView`].

use std::sync::Arc;

use fireline_database::IncidentStore;
use fireline_incident_models::Incident;

use crate::RealtimeError;
use crate::filter::SubscriptionFilter;
use crate::router::{FanoutRouter, RouterMessage, Subscription};
use crate::view::LocalView;

/// Live incident list for one subscriber.
///
/// Polls and events may interleave in any order; the view's
/// last-write-wins merge makes the end state independent of it.
pub struct Dashboard {
    store: Arc<dyn IncidentStore>,
    filter: SubscriptionFilter,
    view: LocalView,
    subscription: Subscription,
}

impl Dashboard {
    /// Subscribes with `filter` and performs the initial poll.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the initial poll fails.
    pub async fn open(
        store: Arc<dyn IncidentStore>,
        router: &FanoutRouter,
        filter: SubscriptionFilter,
    ) -> Result<Self, RealtimeError> {
        // Subscribe before polling so nothing committed in between is lost.
        let subscription = router.subscribe(filter.clone());
        let mut dashboard = Self {
            store,
            filter,
            view: LocalView::new(),
            subscription,
        };
        dashboard.refresh().await?;
        Ok(dashboard)
    }

    /// Full reconciling poll. Returns the number of incidents held.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the poll fails. The view is left
    /// unchanged in that case.
    pub async fn refresh(&mut self) -> Result<usize, RealtimeError> {
        let polled = self.store.list_incidents(&self.filter.to_query()).await?;
        self.view.reconcile(polled);
        log::debug!(
            "Dashboard {:?} refreshed with {} incident(s)",
            self.filter,
            self.view.len()
        );
        Ok(self.view.len())
    }

    /// Waits for the next incident event and applies it.
    ///
    /// Returns whether the view changed. A resync signal triggers a
    /// [`Dashboard::refresh`].
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Closed`] if the router has shut down, or
    /// [`RealtimeError::Store`] if a resync poll fails.
    pub async fn next_update(&mut self) -> Result<bool, RealtimeError> {
        loop {
            match self.subscription.recv().await {
                Some(RouterMessage::Change(event)) => return Ok(self.view.apply(&event)),
                Some(RouterMessage::Resync) => {
                    log::info!("Dashboard {:?} resyncing", self.filter);
                    self.refresh().await?;
                    return Ok(true);
                }
                Some(RouterMessage::Message(_)) => {}
                None => return Err(RealtimeError::Closed),
            }
        }
    }

    /// The filter this dashboard was opened with.
    #[must_use]
    pub const fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    /// Current incidents, newest report first.
    #[must_use]
    pub fn incidents(&self) -> Vec<Incident> {
        self.view.incidents()
    }

    /// The underlying view.
    #[must_use]
    pub const fn view(&self) -> &LocalView {
        &self.view
    }
}
