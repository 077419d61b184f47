//! In-memory activity sink.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::pipeline::{
    domain::{Activity, ActivityContainer},
    ports::{ActivitySink, ActivitySinkError},
};

/// Thread-safe in-memory activity ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActivitySink {
    activities: Arc<RwLock<Vec<Activity>>>,
}

impl InMemoryActivitySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded activity in append order.
    ///
    /// # Errors
    ///
    /// Returns [`ActivitySinkError::Persistence`] when the lock is poisoned.
    pub fn activities(&self) -> Result<Vec<Activity>, ActivitySinkError> {
        let activities = self.activities.read().map_err(|err| {
            ActivitySinkError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(activities.clone())
    }

    /// Returns activities filed under a container in append order.
    ///
    /// # Errors
    ///
    /// Returns [`ActivitySinkError::Persistence`] when the lock is poisoned.
    pub fn for_container(
        &self,
        container: &ActivityContainer,
    ) -> Result<Vec<Activity>, ActivitySinkError> {
        Ok(self
            .activities()?
            .into_iter()
            .filter(|activity| activity.container() == container)
            .collect())
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivitySink {
    async fn record(&self, activity: &Activity) -> Result<(), ActivitySinkError> {
        let mut activities = self.activities.write().map_err(|err| {
            ActivitySinkError::persistence(std::io::Error::other(err.to_string()))
        })?;
        activities.push(activity.clone());
        Ok(())
    }
}
