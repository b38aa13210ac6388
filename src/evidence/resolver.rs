//! REF() resolution: registry lookup, workflow call, canonicalization

use serde::Serialize;
use serde_json::{Map, Value};

use super::canonical::{canonicalize, evidence_hash, EvidenceItem};
use crate::ast::RefCall;
use crate::error::{Result, RqlError};
use crate::runtime::Session;
use crate::workflow::{normalize_records, WorkflowClient};

/// Canonical evidence for one REF call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEvidence {
    pub evidence: Vec<EvidenceItem>,
    pub evidence_hash: String,
    pub source: String,
    pub args: Map<String, Value>,
    pub count: usize,
}

pub struct RefResolver<'a> {
    client: &'a dyn WorkflowClient,
}

impl<'a> RefResolver<'a> {
    pub fn new(client: &'a dyn WorkflowClient) -> Self {
        Self { client }
    }

    /// Resolve a REF call against a registered WORKFLOW source
    pub async fn resolve(&self, call: &RefCall, session: &Session) -> Result<ResolvedEvidence> {
        let source = session
            .registry
            .get_source(&call.source)
            .ok_or_else(|| RqlError::SourceNotFound {
                name: call.source.clone(),
            })?;
        if !source.is_workflow() {
            return Err(RqlError::SourceNotWorkflow {
                name: source.name.clone(),
                source_type: source.source_type.clone(),
            });
        }

        let raw = self.client.invoke(&source.config, &call.args).await?;
        let evidence = canonicalize(normalize_records(raw));
        let evidence_hash = evidence_hash(&evidence);

        tracing::debug!(
            source = %call.source,
            count = evidence.len(),
            hash = %evidence_hash,
            "ref.resolved"
        );

        Ok(ResolvedEvidence {
            count: evidence.len(),
            evidence,
            evidence_hash,
            source: call.source.clone(),
            args: call.args.clone(),
        })
    }
}
