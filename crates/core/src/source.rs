//! Work source trait: pluggable discovery of candidate work.

use crate::error::SourceError;
use crate::work::{DiscoveredWork, WorkSource};
use async_trait::async_trait;

/// A provider of discoverable work items.
///
/// The worker polls every enabled provider once per cycle. Each poll is
/// awaited independently: an `Err` from one provider is logged and the cycle
/// continues with the others. Returning an empty vector is the normal
/// "nothing new" answer.
///
/// Providers that consume their input (a drained file, an acked message)
/// should not discard it in `poll`. The worker calls [`commit`] once every
/// item from the last poll is safely in the queue; until then the same items
/// must be offered again.
///
/// [`commit`]: WorkSourceProvider::commit
#[async_trait]
pub trait WorkSourceProvider: Send + Sync {
    /// Human-readable provider name (e.g. "manual-queue").
    fn name(&self) -> &str;

    /// The source category stamped on items this provider emits.
    fn source(&self) -> WorkSource;

    /// Disabled providers are skipped without being polled.
    fn enabled(&self) -> bool {
        true
    }

    /// Discover new work.
    async fn poll(&self) -> Result<Vec<DiscoveredWork>, SourceError>;

    /// Acknowledge that everything from the last `poll` has been queued.
    async fn commit(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::{Priority, SuggestedWorkflow, Tier};

    struct FixedSource;

    #[async_trait]
    impl WorkSourceProvider for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }
        fn source(&self) -> WorkSource {
            WorkSource::UserRequest
        }
        async fn poll(&self) -> Result<Vec<DiscoveredWork>, SourceError> {
            Ok(vec![DiscoveredWork::new(
                self.source(),
                Priority::Medium,
                Tier::TWO,
                SuggestedWorkflow::BugFix,
                "fixed item",
                "from a fixed source",
            )])
        }
    }

    #[tokio::test]
    async fn providers_are_enabled_by_default() {
        let source = FixedSource;
        assert!(source.enabled());
        let items = source.poll().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, WorkSource::UserRequest);
        assert!(source.commit().await.is_ok());
    }
}
