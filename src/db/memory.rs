//! In-memory repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{DecisionRecord, ExecutionRecord, Repository};
use crate::error::DatabaseError;
use crate::models::Position;

#[derive(Debug, Default)]
struct MemoryState {
    positions: HashMap<String, Position>,
    decisions: Vec<DecisionRecord>,
    executions: Vec<ExecutionRecord>,
}

/// Repository that keeps everything in process memory.
///
/// `set_fail_persist(true)` makes every `persist` fail, for exercising
/// the ledger's error paths.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
    fail_persist: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with positions.
    pub fn with_positions(positions: Vec<Position>) -> Self {
        let state = MemoryState {
            positions: positions.into_iter().map(|p| (p.id.clone(), p)).collect(),
            ..MemoryState::default()
        };
        Self {
            state: Mutex::new(state),
            fail_persist: AtomicBool::new(false),
        }
    }

    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    pub async fn position(&self, id: &str) -> Option<Position> {
        self.state.lock().await.positions.get(id).cloned()
    }

    pub async fn decisions(&self) -> Vec<DecisionRecord> {
        self.state.lock().await.decisions.clone()
    }

    pub async fn executions(&self) -> Vec<ExecutionRecord> {
        self.state.lock().await.executions.clone()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn load_open_positions(&self) -> Result<Vec<Position>, DatabaseError> {
        let state = self.state.lock().await;
        let mut open: Vec<Position> =
            state.positions.values().filter(|p| p.is_open()).cloned().collect();
        open.sort_by_key(|p| p.entry_timestamp);
        Ok(open)
    }

    async fn load_closed_positions(&self) -> Result<Vec<Position>, DatabaseError> {
        let state = self.state.lock().await;
        let mut closed: Vec<Position> =
            state.positions.values().filter(|p| !p.is_open()).cloned().collect();
        closed.sort_by_key(|p| (p.exit_timestamp, p.entry_timestamp));
        Ok(closed)
    }

    async fn persist(&self, position: &Position) -> Result<(), DatabaseError> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable("persist disabled".to_string()));
        }
        self.state
            .lock()
            .await
            .positions
            .insert(position.id.clone(), position.clone());
        Ok(())
    }

    async fn record_decision(&self, record: &DecisionRecord) -> Result<(), DatabaseError> {
        self.state.lock().await.decisions.push(record.clone());
        Ok(())
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> Result<(), DatabaseError> {
        self.state.lock().await.executions.push(record.clone());
        Ok(())
    }
}
