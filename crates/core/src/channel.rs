use crate::error::{PipelineError, Result};
use crate::types::{Artifact, NodeId};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Typed reference to data produced by at most one node.
///
/// Channels are shared by `Arc` between the producing node's outputs and any
/// number of consumer inputs. A channel nobody claims as output is an
/// external input.
#[derive(Debug)]
pub struct Channel {
    type_name: String,
    producer: OnceLock<NodeId>,
    artifacts: RwLock<Vec<Artifact>>,
}

impl Channel {
    pub fn new(type_name: impl Into<String>) -> Arc<Self> {
        Self::with_artifacts(type_name, Vec::new())
    }

    /// Channel with pre-registered artifact descriptors, stamped once the
    /// owning pipeline is known
    pub fn with_artifacts(type_name: impl Into<String>, artifacts: Vec<Artifact>) -> Arc<Self> {
        Arc::new(Self {
            type_name: type_name.into(),
            producer: OnceLock::new(),
            artifacts: RwLock::new(artifacts),
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn producer(&self) -> Option<&NodeId> {
        self.producer.get()
    }

    pub fn is_external(&self) -> bool {
        self.producer.get().is_none()
    }

    /// Record `node_id` as the sole producer of this channel
    pub(crate) fn claim(&self, node_id: &NodeId) -> Result<()> {
        match self.producer.get() {
            Some(existing) if existing == node_id => Ok(()),
            Some(existing) => Err(PipelineError::ChannelAlreadyProduced {
                type_name: self.type_name.clone(),
                producer: existing.clone(),
                claimant: node_id.clone(),
            }),
            None => {
                // Lost race with another claimant: re-check the winner.
                if self.producer.set(node_id.clone()).is_err() {
                    return self.claim(node_id);
                }
                Ok(())
            }
        }
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.read_artifacts().clone()
    }

    pub fn push_artifact(&self, artifact: Artifact) {
        self.write_artifacts().push(artifact);
    }

    /// Stamp buffered artifacts with their producer context
    pub(crate) fn stamp_artifacts(
        &self,
        output_key: &str,
        pipeline_name: &str,
        timestamp_ms: i64,
        producer: &NodeId,
    ) {
        for artifact in self.write_artifacts().iter_mut() {
            artifact.name = Some(output_key.to_string());
            artifact.pipeline_name = Some(pipeline_name.to_string());
            artifact.pipeline_timestamp_ms = Some(timestamp_ms);
            artifact.producer_component = Some(producer.clone());
        }
    }

    fn read_artifacts(&self) -> RwLockReadGuard<'_, Vec<Artifact>> {
        self.artifacts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_artifacts(&self) -> RwLockWriteGuard<'_, Vec<Artifact>> {
        self.artifacts.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unclaimed_channel_is_external() {
        let channel = Channel::new("examples");
        assert!(channel.is_external());
        assert!(channel.producer().is_none());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let channel = Channel::new("model");
        channel.claim(&NodeId::new("trainer")).unwrap();
        channel.claim(&NodeId::new("trainer")).unwrap();

        let err = channel.claim(&NodeId::new("pusher")).unwrap_err();
        assert!(matches!(err, PipelineError::ChannelAlreadyProduced { .. }));
        assert_eq!(channel.producer(), Some(&NodeId::new("trainer")));
    }

    #[test]
    fn test_stamp_artifacts() {
        let channel = Channel::with_artifacts("stats", vec![Artifact::new("stats")]);
        channel.push_artifact(Artifact::new("stats"));
        channel.stamp_artifacts("output", "pipe", 0, &NodeId::new("gen"));

        let artifacts = channel.artifacts();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[1].producer_component, Some(NodeId::new("gen")));
        assert_eq!(artifacts[0].name.as_deref(), Some("output"));
        assert_eq!(artifacts[0].pipeline_name.as_deref(), Some("pipe"));
        assert_eq!(artifacts[0].pipeline_timestamp_ms, Some(0));
        assert_eq!(artifacts[0].producer_component, Some(NodeId::new("gen")));
    }
}
