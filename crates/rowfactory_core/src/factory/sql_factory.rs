//! SQL factory: build instances and persist them through a session.
//!
//! # Responsibility
//! - Resolve declarations, then construct or persist one model instance.
//! - Reuse an existing row when the get-or-create key already matches.
//! - Apply the configured durability step after every create.
//!
//! # Invariants
//! - The caller's original parameters travel with the call; nothing about a
//!   generation pass is stored on the factory except the sequence counter.
//! - A missing key field fails before the session is touched.
//! - Only constraint violations enter the rollback-and-lookup path.

use crate::factory::declaration::{resolve, Declaration};
use crate::factory::options::{FactoryOptions, SessionPersistence};
use crate::factory::{FactoryError, FactoryResult};
use crate::model::record::{bind_positional, Model, ModelError};
use crate::model::value::{Args, FieldValue, Params};
use crate::session::{Session, SessionError};
use log::{debug, info, warn};
use std::cell::Cell;
use std::marker::PhantomData;
use std::rc::Rc;

/// Whether a generation pass persists its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Construct only; no session is touched.
    Build,
    /// Construct and persist through the configured session.
    Create,
}

/// Result of one get-or-create insert attempt.
#[derive(Debug)]
pub enum InsertOutcome<M> {
    /// The new row was accepted.
    Inserted(M),
    /// The insert conflicted and the original parameters found the row.
    ConflictRecovered(M),
    /// The insert conflicted for a reason the lookup key cannot explain.
    ConflictUnrecovered(SessionError),
}

impl<M> InsertOutcome<M> {
    fn label(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "inserted",
            Self::ConflictRecovered(_) => "conflict_recovered",
            Self::ConflictUnrecovered(_) => "conflict_unrecovered",
        }
    }
}

/// Factory producing `M` rows through a session of type `S`.
pub struct SqlFactory<M, S> {
    options: FactoryOptions<S>,
    declarations: Vec<(String, Declaration)>,
    sequence: Rc<Cell<u64>>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model, S: Session> SqlFactory<M, S> {
    pub fn new(options: FactoryOptions<S>) -> Self {
        Self {
            options,
            declarations: Vec::new(),
            sequence: Rc::new(Cell::new(0)),
            _model: PhantomData,
        }
    }

    /// Declares (or redeclares) how `name` is produced.
    pub fn declare(mut self, name: impl Into<String>, declaration: Declaration) -> Self {
        let name = name.into();
        match self.declarations.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = declaration,
            None => self.declarations.push((name, declaration)),
        }
        self
    }

    /// Derives a sibling factory with other options.
    ///
    /// Declarations are copied and the sequence counter is shared, so parent
    /// and child never hand out the same sequence number.
    pub fn with_options(&self, options: FactoryOptions<S>) -> Self {
        Self {
            options,
            declarations: self.declarations.clone(),
            sequence: Rc::clone(&self.sequence),
            _model: PhantomData,
        }
    }

    pub fn options(&self) -> &FactoryOptions<S> {
        &self.options
    }

    /// Next sequence number to be handed out.
    pub fn sequence(&self) -> u64 {
        self.sequence.get()
    }

    pub fn reset_sequence(&self, value: u64) {
        self.sequence.set(value);
    }

    pub fn build(&self, params: Params) -> FactoryResult<M> {
        self.generate(Strategy::Build, params)
    }

    pub fn create(&self, params: Params) -> FactoryResult<M> {
        self.generate(Strategy::Create, params)
    }

    pub fn build_batch(&self, size: usize, params: Params) -> FactoryResult<Vec<M>> {
        self.generate_batch(Strategy::Build, size, params)
    }

    pub fn create_batch(&self, size: usize, params: Params) -> FactoryResult<Vec<M>> {
        self.generate_batch(Strategy::Create, size, params)
    }

    pub fn generate_batch(
        &self,
        strategy: Strategy,
        size: usize,
        params: Params,
    ) -> FactoryResult<Vec<M>> {
        (0..size)
            .map(|_| self.generate(strategy, params.clone()))
            .collect()
    }

    /// Runs one generation pass.
    ///
    /// `params` are the caller's raw values; they are kept unchanged as the
    /// original parameters for conflict recovery and passed down explicitly.
    pub fn generate(&self, strategy: Strategy, params: Params) -> FactoryResult<M> {
        let sequence = self.next_sequence();
        let resolved = resolve(&self.declarations, &params, sequence);
        let (args, kwargs) = self.split_inline_args(resolved)?;

        match strategy {
            Strategy::Build => Ok(M::construct(&args, &kwargs)?),
            Strategy::Create => self.create_model(args, kwargs, &params),
        }
    }

    /// Persists one instance from resolved arguments.
    ///
    /// With get-or-create fields configured the instance comes from
    /// [`SqlFactory::get_or_create`], which leaves it attached to the session
    /// whether it was found, inserted or recovered. Otherwise a new instance
    /// is constructed from all arguments and always added. The persistence
    /// policy runs last.
    pub fn create_model(&self, args: Args, kwargs: Params, original: &Params) -> FactoryResult<M> {
        let factory = self.options.name();
        let handle = self
            .options
            .session()
            .ok_or_else(|| FactoryError::MissingSession {
                factory: factory.to_string(),
            })?;
        let mut session = handle
            .try_borrow_mut()
            .map_err(|_| FactoryError::SessionBusy {
                factory: factory.to_string(),
            })?;

        let instance = if self.options.get_or_create().is_empty() {
            let mut instance = M::construct(&args, &kwargs)?;
            session.add(&mut instance)?;
            instance
        } else {
            self.get_or_create(&mut *session, &args, kwargs, original)?
        };

        let persistence = self.options.session_persistence();
        match persistence {
            SessionPersistence::None => {}
            SessionPersistence::Flush => session.flush()?,
            SessionPersistence::Commit => session.commit()?,
        }

        info!(
            "event=factory_create module=factory status=ok factory={} table={} persistence={}",
            factory,
            M::table(),
            persistence
        );
        Ok(instance)
    }

    /// Returns the row matching the key fields, inserting it when absent.
    ///
    /// Key fields are popped from `kwargs`; the lookup filters on the
    /// positional arguments plus those key fields, and a new instance is
    /// constructed from the same values. A constraint violation on insert
    /// rolls the session back and retries the lookup with the key fields
    /// found in `original`.
    ///
    /// # Errors
    /// - `FactoryError::MissingKeyField` when a key field is absent from
    ///   `kwargs`; raised before any session call.
    /// - The original `SessionError::Integrity` when the conflict is not
    ///   explained by the original key values.
    pub fn get_or_create(
        &self,
        session: &mut S,
        args: &[FieldValue],
        mut kwargs: Params,
        original: &Params,
    ) -> FactoryResult<M> {
        let mut key_fields = Params::new();
        for field in self.options.get_or_create() {
            let value = kwargs
                .remove(field)
                .ok_or_else(|| FactoryError::MissingKeyField {
                    field: field.clone(),
                    factory: self.options.name().to_string(),
                })?;
            key_fields.insert(field.as_str(), value);
        }

        let mut filter = bind_positional::<M>(args)?;
        filter.extend_from(&key_fields);
        if let Some(instance) = session.query_one_or_none::<M>(&filter)? {
            debug!(
                "event=factory_get_or_create module=factory factory={} outcome=found",
                self.options.name()
            );
            return Ok(instance);
        }

        let outcome = self.insert_or_recover(session, args, &key_fields, original)?;
        debug!(
            "event=factory_get_or_create module=factory factory={} outcome={}",
            self.options.name(),
            outcome.label()
        );
        match outcome {
            InsertOutcome::Inserted(instance) | InsertOutcome::ConflictRecovered(instance) => {
                Ok(instance)
            }
            InsertOutcome::ConflictUnrecovered(err) => Err(err.into()),
        }
    }

    fn insert_or_recover(
        &self,
        session: &mut S,
        args: &[FieldValue],
        key_fields: &Params,
        original: &Params,
    ) -> FactoryResult<InsertOutcome<M>> {
        let mut instance = M::construct(args, key_fields)?;
        let conflict = match session.add(&mut instance) {
            Ok(()) => return Ok(InsertOutcome::Inserted(instance)),
            Err(err) if err.is_integrity() => err,
            Err(err) => return Err(err.into()),
        };

        warn!(
            "event=factory_conflict module=factory factory={} table={} error={}",
            self.options.name(),
            M::table(),
            conflict
        );
        session.rollback()?;

        let lookup = original.intersect(self.options.get_or_create());
        if lookup.is_empty() {
            return Ok(InsertOutcome::ConflictUnrecovered(conflict));
        }

        match session.query_one::<M>(&lookup) {
            Ok(found) => Ok(InsertOutcome::ConflictRecovered(found)),
            Err(SessionError::NoResult { .. }) => Ok(InsertOutcome::ConflictUnrecovered(conflict)),
            Err(err) => Err(err.into()),
        }
    }

    fn next_sequence(&self) -> u64 {
        let current = self.sequence.get();
        self.sequence.set(current + 1);
        current
    }

    fn split_inline_args(&self, mut resolved: Params) -> FactoryResult<(Args, Params)> {
        let mut args = Args::with_capacity(self.options.inline_args().len());
        for field in self.options.inline_args() {
            let value = resolved
                .remove(field)
                .ok_or_else(|| ModelError::MissingField {
                    model: M::table(),
                    field: field.clone(),
                })?;
            args.push(value);
        }
        Ok((args, resolved))
    }
}
