//! Fact operations that need the owning registry: resolution of deferred
//! facts and inverse mirroring.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::trace;

use crate::error::{Result, XTypeError};
use crate::fact::Fact;
use crate::registry::{EntityId, Registry};

/// One pending `add_fact` in the mirroring work queue.
struct FactJob {
    source: EntityId,
    name: String,
    target: EntityId,
    edge_properties: Value,
}

impl Registry {
    /// Returns the facts of relation `name` on `id`, resolving deferred facts.
    ///
    /// Each deferred fact is loaded by its cached identifier through
    /// [`load_by_uri`](Registry::load_by_uri), the handle is stored back and
    /// inverse mirroring runs against the resolved neighbour. Cached
    /// identifiers of live targets are refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownRelation`], [`XTypeError::FactsUnknown`],
    /// [`XTypeError::UnresolvableFact`] for a deferred fact without an
    /// identifier, or the resolution error of [`load_by_uri`](Registry::load_by_uri).
    pub fn get_facts(&mut self, id: EntityId, name: &str) -> Result<Vec<Fact>> {
        self.resolve_facts(id, name, false)
    }

    /// Resolves the facts of `name` on `id`. With `keep_missing`, a target
    /// the registry cannot find leaves its fact deferred instead of failing.
    pub(crate) fn resolve_facts(
        &mut self,
        id: EntityId,
        name: &str,
        keep_missing: bool,
    ) -> Result<Vec<Fact>> {
        let count = self.entity(id)?.facts(name)?.len();
        for index in 0..count {
            let Some(fact) = self.entity(id)?.facts(name)?.get(index).cloned() else {
                break;
            };
            match fact.target.filter(|target| self.is_alive(*target)) {
                Some(target) => {
                    if let Some(current) = self.entity(target)?.uri() {
                        self.update_fact(id, name, index, |fact| {
                            fact.set_uri(&current, Some(current.as_str()));
                        })?;
                    }
                }
                None => {
                    let uri = fact.target_uri.clone().ok_or_else(|| {
                        let classname = self
                            .entity(id)
                            .map(|e| e.classname().to_owned())
                            .unwrap_or_default();
                        XTypeError::UnresolvableFact {
                            classname,
                            name: name.to_owned(),
                        }
                    })?;
                    let target = match self.load_by_uri(&uri) {
                        Ok(target) => target,
                        Err(XTypeError::NotFound(_)) if keep_missing => {
                            trace!(source = %id, relation = name, %uri, "target not found, fact stays deferred");
                            continue;
                        }
                        Err(err) => return Err(err),
                    };
                    let current = self.entity(target)?.uri();
                    trace!(source = %id, relation = name, %uri, "resolved deferred fact");
                    self.update_fact(id, name, index, |fact| {
                        fact.target = Some(target);
                        if let Some(current) = current {
                            fact.target_uri = Some(current);
                        }
                    })?;
                    let jobs = self.mirror_jobs(id, name, target, &fact.edge_properties)?;
                    self.run_fact_jobs(jobs)?;
                }
            }
        }
        Ok(self.entity(id)?.facts(name)?.to_vec())
    }

    /// Adds a fact from `id` to `target` under relation `name`.
    ///
    /// Edge properties are merged onto the relation's template. An existing
    /// fact for the same target is updated in place. A new fact is mirrored
    /// into every structurally equal relation of opposite direction on the
    /// target, transitively, until only updates remain.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownRelation`], [`XTypeError::InvalidTarget`]
    /// if `target` is not a live working instance, template validation
    /// errors, or [`XTypeError::CardinalityViolation`]. A violation raised
    /// while mirroring leaves the facts added so far in place.
    pub fn add_fact(
        &mut self,
        id: EntityId,
        name: &str,
        target: EntityId,
        edge_properties: &Value,
    ) -> Result<()> {
        self.entity(id)?.relation(name)?;
        self.check_target(id, name, target)?;
        self.run_fact_jobs(vec![FactJob {
            source: id,
            name: name.to_owned(),
            target,
            edge_properties: edge_properties.clone(),
        }])
    }

    /// Removes the facts of `name` on `id` that point at `target`.
    ///
    /// The mirrored fact on `target` is kept. Unknown facts are left unknown.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::UnknownRelation`] or [`XTypeError::InvalidTarget`].
    pub fn remove_fact(&mut self, id: EntityId, name: &str, target: EntityId) -> Result<()> {
        self.entity(id)?.relation(name)?;
        self.check_target(id, name, target)?;
        self.refresh_targets(id, name)?;
        let target_uri = self.entity(target)?.uri();
        let removed = self
            .entity_mut(id)?
            .remove_facts(name, Some(target), target_uri.as_deref())?;
        trace!(source = %id, relation = name, %target, removed, "removed facts");
        Ok(())
    }

    /// Refreshes the cached identifiers of every fact on `id`.
    ///
    /// Relation-based identifier parts read cached identifiers, so this
    /// brings [`Entity::uri`](crate::Entity::uri) up to date after a
    /// neighbour was renamed. [`commit`](Registry::commit) calls it first.
    ///
    /// # Errors
    ///
    /// Returns [`XTypeError::ForeignEntity`] or [`XTypeError::UnknownEntity`]
    /// for `id`.
    pub fn refresh_facts(&mut self, id: EntityId) -> Result<()> {
        let names: Vec<String> = self.entity(id)?.relations().keys().cloned().collect();
        for name in names {
            self.refresh_targets(id, &name)?;
        }
        Ok(())
    }

    /// Refreshes cached identifiers from live handles and drops expired ones.
    fn refresh_targets(&mut self, id: EntityId, name: &str) -> Result<()> {
        let targets: Vec<Option<EntityId>> = self
            .entity(id)?
            .cached_facts(name)
            .unwrap_or_default()
            .iter()
            .map(|fact| fact.target)
            .collect();
        for (index, target) in targets.into_iter().enumerate() {
            let Some(target) = target else {
                continue;
            };
            match self.entity(target).map(|entity| entity.uri()) {
                Ok(Some(current)) => {
                    self.update_fact(id, name, index, |fact| fact.target_uri = Some(current))?;
                }
                Ok(None) => {}
                Err(_) => self.update_fact(id, name, index, |fact| fact.target = None)?,
            }
        }
        Ok(())
    }

    fn check_target(&self, id: EntityId, name: &str, target: EntityId) -> Result<()> {
        match self.entity(target) {
            Ok(_) => Ok(()),
            Err(XTypeError::UnknownEntity(_)) => Err(XTypeError::InvalidTarget {
                classname: self.entity(id)?.classname().to_owned(),
                name: name.to_owned(),
            }),
            Err(err) => Err(err),
        }
    }

    fn update_fact(
        &mut self,
        id: EntityId,
        name: &str,
        index: usize,
        update: impl FnOnce(&mut Fact),
    ) -> Result<()> {
        if let Some(fact) = self
            .entity_mut(id)?
            .facts_mut(name)
            .and_then(|facts| facts.get_mut(index))
        {
            update(fact);
        }
        Ok(())
    }

    /// Collects the inverse relations of `target` that mirror `name` on `source`.
    fn mirror_jobs(
        &self,
        source: EntityId,
        name: &str,
        target: EntityId,
        edge_properties: &Value,
    ) -> Result<Vec<FactJob>> {
        let source_entity = self.entity(source)?;
        let relation = source_entity.relation(name)?;
        let forward = source_entity.relation_dir(name)?;
        let target_entity = self.entity(target)?;
        let mut jobs = Vec::new();
        for (other_name, other) in target_entity.relations() {
            if target_entity.relation_dir(other_name)? == forward || other != relation {
                continue;
            }
            trace!(%source, relation = name, %target, inverse = %other_name, "mirroring fact");
            jobs.push(FactJob {
                source: target,
                name: other_name.clone(),
                target: source,
                edge_properties: edge_properties.clone(),
            });
        }
        Ok(jobs)
    }

    fn run_fact_jobs(&mut self, jobs: Vec<FactJob>) -> Result<()> {
        let mut queue = VecDeque::from(jobs);
        while let Some(job) = queue.pop_front() {
            self.refresh_targets(job.source, &job.name)?;
            let target_uri = self.entity(job.target)?.uri();
            let appended = self.entity_mut(job.source)?.upsert_fact(
                &job.name,
                Some(job.target),
                target_uri,
                &job.edge_properties,
            )?;
            if !appended {
                trace!(source = %job.source, relation = %job.name, "fact exists, updated in place");
                continue;
            }
            queue.extend(self.mirror_jobs(job.source, &job.name, job.target, &job.edge_properties)?);
        }
        Ok(())
    }
}
