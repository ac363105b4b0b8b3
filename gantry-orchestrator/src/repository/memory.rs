//! In-memory repositories
//!
//! Used for local development (`GANTRY_STORAGE=memory`) and tests.
//! Records live in an append-only arena with index maps on top; a single
//! mutex guards the whole arena, which makes `create` and `update` atomic
//! within this process only. Several processes sharing nothing get no
//! protection from each other.

use async_trait::async_trait;
use chrono::Utc;
use gantry_core::domain::execution::{Execution, ExecutionStatus};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::execution::Page;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::repository::error::{Result, StoreError};
use crate::repository::execution::{ExecutionRepository, Pagination, paginate};
use crate::repository::pipeline::PipelineRepository;

/// Process-local [`ExecutionRepository`]
#[derive(Default)]
pub struct MemoryExecutionRepository {
    arena: Mutex<Arena>,
}

#[derive(Default)]
struct Arena {
    /// Slots are tombstoned on delete, never reused.
    records: Vec<Option<Execution>>,
    by_id: HashMap<Uuid, usize>,
    by_number: HashMap<(Uuid, i64), usize>,
    by_event: HashMap<(Uuid, String), usize>,
    /// Last sequence number handed out per pipeline.
    counters: HashMap<Uuid, i64>,
}

impl Arena {
    fn get(&self, slot: usize) -> Option<&Execution> {
        self.records.get(slot).and_then(Option::as_ref)
    }

    fn pipeline_records(&self, pipeline_id: Uuid) -> Vec<&Execution> {
        let mut records: Vec<&Execution> = self
            .by_number
            .iter()
            .filter(|((pipeline, _), _)| *pipeline == pipeline_id)
            .filter_map(|(_, slot)| self.get(*slot))
            .collect();
        records.sort_by(|a, b| b.number.cmp(&a.number));
        records
    }
}

impl MemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn arena(&self) -> Result<MutexGuard<'_, Arena>> {
        self.arena
            .lock()
            .map_err(|_| StoreError::Corrupt("memory execution store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ExecutionRepository for MemoryExecutionRepository {
    async fn create(&self, execution: Execution) -> Result<Execution> {
        let mut arena = self.arena()?;
        let pipeline_id = execution.pipeline_id;

        if let Some(key) = &execution.event_key {
            if arena.by_event.contains_key(&(pipeline_id, key.clone())) {
                return Err(StoreError::DuplicateEvent {
                    pipeline_id,
                    key: key.clone(),
                });
            }
        }

        let counter = arena.counters.entry(pipeline_id).or_insert(0);
        *counter += 1;
        let number = *counter;

        if arena.by_number.contains_key(&(pipeline_id, number)) {
            return Err(StoreError::Conflict {
                pipeline_id,
                number,
            });
        }

        let now = Utc::now();
        let created = Execution {
            id: Uuid::new_v4(),
            number,
            version: 1,
            created: now,
            updated: now,
            ..execution
        };

        let slot = arena.records.len();
        arena.records.push(Some(created.clone()));
        arena.by_id.insert(created.id, slot);
        arena.by_number.insert((pipeline_id, number), slot);
        if let Some(key) = &created.event_key {
            arena.by_event.insert((pipeline_id, key.clone()), slot);
        }

        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Execution> {
        let arena = self.arena()?;
        arena
            .by_id
            .get(&id)
            .and_then(|slot| arena.get(*slot))
            .cloned()
            .ok_or_else(|| StoreError::execution_not_found(id))
    }

    async fn find_by_number(&self, pipeline_id: Uuid, number: i64) -> Result<Execution> {
        let arena = self.arena()?;
        arena
            .by_number
            .get(&(pipeline_id, number))
            .and_then(|slot| arena.get(*slot))
            .cloned()
            .ok_or_else(|| StoreError::number_not_found(pipeline_id, number))
    }

    async fn find_by_event_key(&self, pipeline_id: Uuid, key: &str) -> Result<Option<Execution>> {
        let arena = self.arena()?;
        Ok(arena
            .by_event
            .get(&(pipeline_id, key.to_string()))
            .and_then(|slot| arena.get(*slot))
            .cloned())
    }

    async fn list(&self, pipeline_id: Uuid, page: Pagination) -> Result<Page<Execution>> {
        let arena = self.arena()?;
        let mut items: Vec<Execution> = arena
            .pipeline_records(pipeline_id)
            .into_iter()
            .filter(|e| page.cursor.is_none_or(|cursor| e.number < cursor))
            .take(page.limit as usize + 1)
            .cloned()
            .collect();

        Ok(paginate(&mut items, page.limit))
    }

    async fn list_active(&self, pipeline_id: Uuid) -> Result<Vec<Execution>> {
        let arena = self.arena()?;
        Ok(arena
            .pipeline_records(pipeline_id)
            .into_iter()
            .filter(|e| matches!(e.status, ExecutionStatus::Pending | ExecutionStatus::Running))
            .cloned()
            .collect())
    }

    async fn update(&self, execution: &Execution) -> Result<Execution> {
        let mut arena = self.arena()?;
        let slot = *arena
            .by_id
            .get(&execution.id)
            .ok_or_else(|| StoreError::execution_not_found(execution.id))?;
        let stored = arena.records[slot]
            .as_mut()
            .ok_or_else(|| StoreError::execution_not_found(execution.id))?;

        if stored.version != execution.version {
            return Err(StoreError::VersionConflict {
                id: execution.id,
                version: execution.version,
            });
        }

        // Same column set the PostgreSQL update writes.
        stored.status = execution.status;
        stored.error = execution.error.clone();
        stored.params = execution.params.clone();
        stored.debug = execution.debug;
        stored.started = execution.started;
        stored.finished = execution.finished;
        stored.updated = Utc::now();
        stored.version += 1;

        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut arena = self.arena()?;
        let slot = arena
            .by_id
            .remove(&id)
            .ok_or_else(|| StoreError::execution_not_found(id))?;

        if let Some(record) = arena.records[slot].take() {
            arena.by_number.remove(&(record.pipeline_id, record.number));
            if let Some(key) = record.event_key {
                arena.by_event.remove(&(record.pipeline_id, key));
            }
        }
        Ok(())
    }
}

/// Process-local [`PipelineRepository`]
#[derive(Default)]
pub struct MemoryPipelineRepository {
    pipelines: RwLock<HashMap<Uuid, Pipeline>>,
}

impl MemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a pipeline definition.
    pub fn insert(&self, pipeline: Pipeline) -> Result<()> {
        self.pipelines
            .write()
            .map_err(|_| StoreError::Corrupt("memory pipeline store lock poisoned".to_string()))?
            .insert(pipeline.id, pipeline);
        Ok(())
    }

    /// Seed definitions from a JSON array of pipelines.
    pub fn load_json(&self, json: &str) -> anyhow::Result<usize> {
        let pipelines: Vec<Pipeline> = serde_json::from_str(json)?;
        let count = pipelines.len();
        for pipeline in pipelines {
            self.insert(pipeline)?;
        }
        Ok(count)
    }

    pub fn load_file(&self, path: &Path) -> anyhow::Result<usize> {
        self.load_json(&std::fs::read_to_string(path)?)
    }
}

#[async_trait]
impl PipelineRepository for MemoryPipelineRepository {
    async fn find(&self, id: Uuid) -> Result<Pipeline> {
        self.pipelines
            .read()
            .map_err(|_| StoreError::Corrupt("memory pipeline store lock poisoned".to_string()))?
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::pipeline_not_found(id))
    }
}
