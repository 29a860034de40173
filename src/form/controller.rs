use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde_json::Value;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use super::channels::{FieldErrorChannels, FormNotice};
use super::data::FormData;
use super::errors::{ErrorParams, ErrorSet, FieldError, params};
use super::field::{Field, FieldGroup, FieldKey, FieldSpecs, FieldValue, FormValues, apply_at};
use super::transport::{Method, SubmitFailure, SubmitTransport};
use super::validation::CrossFieldValidator;

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form#{}", self.0)
    }
}

/// Submit lock. Anything but `Unlocked` rejects a new submission.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SubmitLock {
    #[default]
    Unlocked,
    /// A submission is being validated or is awaiting the transport.
    InFlight,
    /// The server rejected the last submission; the next edit unlocks.
    FailedAwaitingEdit,
}

impl SubmitLock {
    pub fn is_locked(self) -> bool {
        self != SubmitLock::Unlocked
    }
}

/// What a call to [`FormController::submit`] ended with.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Sent and accepted, or handled locally when the form has no address.
    Submitted(Value),
    /// Client-side validation failed; nothing was sent.
    Invalid,
    /// `validate_form` returned these codes; nothing was sent.
    ValidationFailed(Vec<String>),
    /// The transport reported a failure.
    Rejected(SubmitFailure),
    /// The controller was disposed while the request was pending.
    Discarded,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
    InvalidStateTransition { from: SubmitLock, to: SubmitLock },
    AlreadySubmitting,
    Disposed,
    UnknownField(String),
    FieldType { field: String, expected: &'static str },
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "form state lock poisoned while {context}")
            }
            FormError::InvalidStateTransition { from, to } => {
                write!(f, "invalid submit lock transition: {from:?} -> {to:?}")
            }
            FormError::AlreadySubmitting => f.write_str("form submit is already in progress"),
            FormError::Disposed => f.write_str("form has been disposed"),
            FormError::UnknownField(field) => write!(f, "unknown form field `{field}`"),
            FormError::FieldType { field, expected } => {
                write!(f, "field `{field}` does not hold a {expected} value")
            }
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

pub type BoxedFormValidation<'a> = Pin<Box<dyn Future<Output = Vec<String>> + Send + 'a>>;

/// Everything a concrete form supplies to its controller.
///
/// Hooks are called without any controller lock held, so they may query the
/// controller. The one exception is [`prepare_data_before_submit`], which
/// receives the field tree directly and must not call back into it.
///
/// [`prepare_data_before_submit`]: FormDefinition::prepare_data_before_submit
pub trait FormDefinition: Send + Sync + 'static {
    fn field_specs(&self) -> FieldSpecs;

    /// Entity values loaded as the pristine state, keyed by field path.
    fn initial_data(&self) -> FormValues {
        FormValues::new()
    }

    /// Target of the submission. Empty means the form only collects data
    /// locally and never calls the transport.
    fn submit_address(&self) -> String;

    fn submit_method(&self) -> Method {
        Method::Post
    }

    fn cross_field_validator(&self) -> Option<Arc<dyn CrossFieldValidator>> {
        None
    }

    fn prepare_data_before_submit(&self, _fields: &mut FieldGroup) {}

    /// Additional checks run after the field rules pass.
    fn validate_form<'a>(&'a self, _values: &'a FormValues) -> BoxedFormValidation<'a> {
        Box::pin(async { Vec::new() })
    }

    fn submit_body(&self, fields: &FieldGroup) -> Value {
        fields.to_json()
    }

    fn on_submit_success(&self, result: &Value);

    fn on_submit_error(&self, _failure: &SubmitFailure) {}

    fn on_validate_form_error(&self, codes: &[String]) {
        self.on_submit_error(&SubmitFailure::Custom(codes.to_vec()));
    }

    fn on_submit_lock_changed(&self, _locked: bool) {}
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldMeta {
    pub touched: bool,
    pub dirty: bool,
    pub errors: ErrorSet,
}

#[derive(Clone, Debug)]
pub struct FormSnapshot {
    pub values: FormValues,
    pub is_valid: bool,
    pub is_dirty: bool,
    pub submitted: bool,
    pub submit_lock: SubmitLock,
    pub submission_failed: bool,
    pub submit_count: u32,
    pub form_errors: ErrorSet,
    pub field_meta: IndexMap<FieldKey, FieldMeta>,
}

pub(super) struct FormState {
    pub(super) fields: FieldGroup,
    pub(super) form_errors: ErrorSet,
    pub(super) submitted: bool,
    pub(super) lock: SubmitLock,
    pub(super) submission_failed: bool,
    pub(super) submit_count: u32,
    pub(super) disposed: bool,
}

impl FormState {
    fn is_valid(&self) -> bool {
        self.fields.is_valid() && self.form_errors.is_empty()
    }
}

pub struct FormController<D: FormDefinition> {
    id: FormId,
    definition: Arc<D>,
    transport: Arc<dyn SubmitTransport>,
    cross_field: Option<Arc<dyn CrossFieldValidator>>,
    pub(super) state: Arc<RwLock<FormState>>,
    channels: FieldErrorChannels,
}

impl<D: FormDefinition> Clone for FormController<D> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            definition: self.definition.clone(),
            transport: self.transport.clone(),
            cross_field: self.cross_field.clone(),
            state: self.state.clone(),
            channels: self.channels.clone(),
        }
    }
}

impl<D: FormDefinition> FormController<D> {
    pub fn new(definition: D, transport: impl SubmitTransport + 'static) -> Self {
        Self::with_transport(Arc::new(definition), Arc::new(transport))
    }

    pub fn with_transport(definition: Arc<D>, transport: Arc<dyn SubmitTransport>) -> Self {
        let id = FormId::next();
        let mut fields = FieldGroup::from_specs(&definition.field_specs());
        for (path, value) in definition.initial_data() {
            match fields.field_mut(&path) {
                Some(field) => field.load(value),
                None => warn!(form = %id, field = %path, "initial data for unknown field"),
            }
        }
        let channels = FieldErrorChannels::new(fields.paths());
        let cross_field = definition.cross_field_validator();

        let mut state = FormState {
            fields,
            form_errors: ErrorSet::new(),
            submitted: false,
            lock: SubmitLock::Unlocked,
            submission_failed: false,
            submit_count: 0,
            disposed: false,
        };
        revalidate_all(&mut state, cross_field.as_deref(), false);
        channels.publish_all(collect_errors(&state.fields), false);
        debug!(form = %id, fields = channels.len(), "form initialized");

        Self {
            id,
            definition,
            transport,
            cross_field,
            state: Arc::new(RwLock::new(state)),
            channels,
        }
    }

    pub fn form_id(&self) -> FormId {
        self.id
    }

    pub fn definition(&self) -> &D {
        &self.definition
    }

    pub fn channels(&self) -> &FieldErrorChannels {
        &self.channels
    }

    /// Error stream of one field: the current set first, then every change.
    pub fn subscribe(&self, path: impl Into<FieldKey>) -> FormResult<WatchStream<ErrorSet>> {
        let path = path.into();
        if self.channels.is_closed() {
            return Err(FormError::Disposed);
        }
        self.channels
            .subscribe(&path)
            .ok_or_else(|| FormError::UnknownField(path.to_string()))
    }

    /// Stores a user edit, revalidates the field and the cross-field checks,
    /// and releases a lock left by a rejected submission.
    pub fn set_value(
        &self,
        path: impl Into<FieldKey>,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        let path = path.into();
        let (errors, released) = {
            let mut state = write_lock(&self.state, "writing field value")?;
            if state.disposed {
                return Err(FormError::Disposed);
            }
            let field = state
                .fields
                .field_mut(&path)
                .ok_or_else(|| FormError::UnknownField(path.to_string()))?;
            field.set_value(value.into());
            field.touched = true;
            field.run_rules();
            apply_cross_field(&mut state, self.cross_field.as_deref());
            let released = release_after_edit(&mut state)?;
            (collect_errors(&state.fields), released)
        };
        self.channels.publish_all(errors, false);
        if released {
            debug!(form = %self.id, field = %path, "edit after rejected submit released lock");
            self.definition.on_submit_lock_changed(false);
        }
        Ok(())
    }

    pub fn mark_touched(&self, path: impl Into<FieldKey>) -> FormResult<()> {
        self.update_at(path.into(), "marking field touched", |field| {
            field.touched = true
        })
    }

    pub fn mark_dirty(&self, path: impl Into<FieldKey>) -> FormResult<()> {
        self.update_at(path.into(), "marking field dirty", |field| field.dirty = true)
    }

    pub fn mark_all_touched(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "marking all fields touched")?;
        state.fields.visit_mut(&mut |_, field| field.touched = true);
        Ok(())
    }

    /// Clears every dirty flag without touching values.
    pub fn mark_pristine(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "marking form pristine")?;
        state.fields.visit_mut(&mut |_, field| field.dirty = false);
        Ok(())
    }

    fn update_at(
        &self,
        path: FieldKey,
        context: &'static str,
        mut update: impl FnMut(&mut Field),
    ) -> FormResult<()> {
        let mut state = write_lock(&self.state, context)?;
        if apply_at(&mut state.fields, &path, &mut |_, field| update(field)) {
            Ok(())
        } else {
            Err(FormError::UnknownField(path.to_string()))
        }
    }

    /// Touches, dirties and revalidates every field, then reruns the
    /// cross-field checks. Returns the aggregate validity.
    pub fn validate_all(&self) -> FormResult<bool> {
        let (valid, errors) = {
            let mut state = write_lock(&self.state, "validating all fields")?;
            let valid = revalidate_all(&mut state, self.cross_field.as_deref(), true);
            (valid, collect_errors(&state.fields))
        };
        self.channels.publish_all(errors, true);
        Ok(valid)
    }

    /// Runs the submit protocol.
    ///
    /// Returns [`FormError::AlreadySubmitting`] without side effects while the
    /// lock is engaged. Every other path returns control with the lock either
    /// released or left in [`SubmitLock::FailedAwaitingEdit`], including an
    /// error raised after the lock was taken.
    pub async fn submit(&self) -> FormResult<SubmitOutcome> {
        {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if state.disposed {
                return Err(FormError::Disposed);
            }
            if state.lock.is_locked() {
                debug!(form = %self.id, lock = ?state.lock, "submit rejected while locked");
                return Err(FormError::AlreadySubmitting);
            }
            state.submitted = true;
            state.submit_count = state.submit_count.saturating_add(1);
            transition_lock(&mut state, SubmitLock::InFlight)?;
        }
        self.definition.on_submit_lock_changed(true);
        self.channels.publish_notices(Vec::new());

        let outcome = self.run_submission().await;
        if let Err(error) = &outcome {
            self.abandon_submission(error);
        }
        outcome
    }

    async fn run_submission(&self) -> FormResult<SubmitOutcome> {
        let (valid, errors) = {
            let mut state = write_lock(&self.state, "validating before submit")?;
            self.definition.prepare_data_before_submit(&mut state.fields);
            let valid = revalidate_all(&mut state, self.cross_field.as_deref(), true);
            (valid, collect_errors(&state.fields))
        };
        self.channels.publish_all(errors, true);

        if !valid {
            debug!(form = %self.id, "submit stopped by client validation");
            self.unlock()?;
            self.definition.on_submit_error(&SubmitFailure::Invalid);
            return Ok(SubmitOutcome::Invalid);
        }

        let values = self.values()?;
        let codes = self.definition.validate_form(&values).await;
        if self.is_disposed()? {
            return Ok(SubmitOutcome::Discarded);
        }
        if !codes.is_empty() {
            debug!(form = %self.id, ?codes, "submit stopped by form validation");
            self.unlock()?;
            self.definition.on_validate_form_error(&codes);
            return Ok(SubmitOutcome::ValidationFailed(codes));
        }

        let body = {
            let state = read_lock(&self.state, "serializing submit body")?;
            self.definition.submit_body(&state.fields)
        };
        let address = self.definition.submit_address();
        if address.is_empty() {
            debug!(form = %self.id, "no submit address, completing locally");
            return self.finish_success(body);
        }

        let method = self.definition.submit_method();
        debug!(form = %self.id, %method, %address, "sending submission");
        let response = self.transport.send(method, &address, body).await;
        if self.is_disposed()? {
            debug!(form = %self.id, "form disposed while submitting, dropping response");
            return Ok(SubmitOutcome::Discarded);
        }

        match response {
            Ok(result) => self.finish_success(result),
            Err(error) => {
                let failure = SubmitFailure::from_transport(error);
                warn!(form = %self.id, %failure, "submission rejected");
                self.route_failure(&failure)?;
                {
                    let mut state = write_lock(&self.state, "recording rejected submit")?;
                    state.submission_failed = true;
                    transition_lock(&mut state, SubmitLock::FailedAwaitingEdit)?;
                }
                self.definition.on_submit_error(&failure);
                Ok(SubmitOutcome::Rejected(failure))
            }
        }
    }

    fn finish_success(&self, result: Value) -> FormResult<SubmitOutcome> {
        {
            let mut state = write_lock(&self.state, "completing submit")?;
            state.submission_failed = false;
            transition_lock(&mut state, SubmitLock::Unlocked)?;
        }
        self.definition.on_submit_lock_changed(false);
        self.definition.on_submit_success(&result);
        Ok(SubmitOutcome::Submitted(result))
    }

    fn unlock(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "releasing submit lock")?;
            transition_lock(&mut state, SubmitLock::Unlocked)?;
        }
        self.definition.on_submit_lock_changed(false);
        Ok(())
    }

    /// Releases an in-flight lock after `run_submission` failed with an
    /// error. Recovers a poisoned state so the form never stays locked.
    fn abandon_submission(&self, error: &FormError) {
        let released = {
            let mut state = match self.state.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let released = state.lock == SubmitLock::InFlight;
            if released {
                state.lock = SubmitLock::Unlocked;
            }
            released
        };
        warn!(form = %self.id, %error, released, "submit aborted");
        if released {
            self.definition.on_submit_lock_changed(false);
        }
    }

    /// Sends a business error to its field, or to the form-level notices when
    /// it names no known field. Other failures carry nothing to route.
    fn route_failure(&self, failure: &SubmitFailure) -> FormResult<()> {
        let SubmitFailure::Business(error) = failure else {
            return Ok(());
        };
        let notice = FormNotice::new(error.i18n_key.clone(), error.params());
        let Some(field_name) = error.field.clone() else {
            self.channels.publish_notices(vec![notice]);
            return Ok(());
        };

        let path = FieldKey::from(field_name);
        let errors = {
            let mut state = write_lock(&self.state, "routing business error")?;
            match state.fields.field_mut(&path) {
                Some(field) => {
                    field.errors.add(error.i18n_key.clone(), error.params());
                    field.touched = true;
                    field.dirty = true;
                    Some(field.errors.clone())
                }
                None => None,
            }
        };
        match errors {
            Some(errors) => {
                self.channels.publish(&path, errors);
            }
            None => {
                warn!(form = %self.id, field = %path, "business error for unknown field");
                self.channels.publish_notices(vec![notice]);
            }
        }
        Ok(())
    }

    /// Restores initial values and the untouched state, then revalidates.
    pub fn reset(&self) -> FormResult<()> {
        let (errors, released) = {
            let mut state = write_lock(&self.state, "resetting form")?;
            state.submitted = false;
            state.fields.visit_mut(&mut |_, field| {
                field.reset();
                field.run_rules();
            });
            state.form_errors = ErrorSet::new();
            apply_cross_field(&mut state, self.cross_field.as_deref());
            let released = release_after_edit(&mut state)?;
            (collect_errors(&state.fields), released)
        };
        self.channels.publish_all(errors, false);
        self.channels.publish_notices(Vec::new());
        if released {
            self.definition.on_submit_lock_changed(false);
        }
        Ok(())
    }

    /// Attaches each message to its field under the `validation` code,
    /// replacing an earlier message. Returns whether any named field exists.
    pub fn set_form_errors(&self, errors: &[FieldError]) -> FormResult<bool> {
        let (applied, updates) = {
            let mut state = write_lock(&self.state, "setting form errors")?;
            let mut applied = false;
            let mut updates = Vec::new();
            for error in errors {
                let path = FieldKey::from(error.field.clone());
                let Some(field) = state.fields.field_mut(&path) else {
                    continue;
                };
                field
                    .errors
                    .set("validation", params([("message", error.message.as_str())]));
                field.touched = true;
                applied = true;
                updates.push((path, field.errors.clone()));
            }
            (applied, updates)
        };
        self.channels.publish_all(updates, false);
        Ok(applied)
    }

    /// Adds one error code to a field, keeping the codes already present.
    pub fn add_field_error(
        &self,
        path: impl Into<FieldKey>,
        code: impl Into<String>,
        params: ErrorParams,
    ) -> FormResult<bool> {
        let code = code.into();
        self.merge_field_error(path.into(), |errors| errors.add(code, params))
    }

    /// Removes one error code from a field; the field is valid again once no
    /// codes remain.
    pub fn remove_field_error(&self, path: impl Into<FieldKey>, code: &str) -> FormResult<bool> {
        self.merge_field_error(path.into(), |errors| errors.remove(code))
    }

    fn merge_field_error(
        &self,
        path: FieldKey,
        merge: impl FnOnce(&mut ErrorSet) -> bool,
    ) -> FormResult<bool> {
        let (changed, errors) = {
            let mut state = write_lock(&self.state, "merging field error")?;
            let field = state
                .fields
                .field_mut(&path)
                .ok_or_else(|| FormError::UnknownField(path.to_string()))?;
            let changed = merge(&mut field.errors);
            (changed, field.errors.clone())
        };
        if changed {
            self.channels.publish(&path, errors);
        }
        Ok(changed)
    }

    pub fn value(&self, path: impl Into<FieldKey>) -> FormResult<FieldValue> {
        let path = path.into();
        read_lock(&self.state, "reading field value")?
            .fields
            .field(&path)
            .map(|field| field.value().clone())
            .ok_or_else(|| FormError::UnknownField(path.to_string()))
    }

    pub fn values(&self) -> FormResult<FormValues> {
        Ok(read_lock(&self.state, "reading form values")?.fields.values())
    }

    pub fn field_errors(&self, path: impl Into<FieldKey>) -> FormResult<ErrorSet> {
        let path = path.into();
        read_lock(&self.state, "reading field errors")?
            .fields
            .field(&path)
            .map(|field| field.errors().clone())
            .ok_or_else(|| FormError::UnknownField(path.to_string()))
    }

    /// Errors a renderer should show: none until the field is touched or the
    /// form has been submitted.
    pub fn display_errors(&self, path: impl Into<FieldKey>) -> FormResult<Option<ErrorSet>> {
        let path = path.into();
        let state = read_lock(&self.state, "reading display errors")?;
        let field = state
            .fields
            .field(&path)
            .ok_or_else(|| FormError::UnknownField(path.to_string()))?;
        if !field.is_touched() && !state.submitted {
            return Ok(None);
        }
        Ok((!field.errors().is_empty()).then(|| field.errors().clone()))
    }

    pub fn form_errors(&self) -> FormResult<ErrorSet> {
        Ok(read_lock(&self.state, "reading form errors")?.form_errors.clone())
    }

    pub fn is_valid(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading validity")?.is_valid())
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading dirty flag")?.fields.is_dirty())
    }

    pub fn is_submitted(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submitted flag")?.submitted)
    }

    pub fn submit_lock(&self) -> FormResult<SubmitLock> {
        Ok(read_lock(&self.state, "reading submit lock")?.lock)
    }

    pub fn is_submit_locked(&self) -> FormResult<bool> {
        Ok(self.submit_lock()?.is_locked())
    }

    pub fn submission_failed(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submission failed flag")?.submission_failed)
    }

    /// Dirty check before leaving the form. Clean forms proceed; dirty ones
    /// proceed only if `confirm` agrees to drop the changes.
    pub fn confirm_discard(&self, confirm: impl FnOnce() -> bool) -> FormResult<bool> {
        if !self.is_dirty()? {
            return Ok(true);
        }
        Ok(confirm())
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        let mut field_meta = IndexMap::new();
        state.fields.visit(&mut |path, field| {
            field_meta.insert(
                path.clone(),
                FieldMeta {
                    touched: field.is_touched(),
                    dirty: field.is_dirty(),
                    errors: field.errors().clone(),
                },
            );
        });
        Ok(FormSnapshot {
            values: state.fields.values(),
            is_valid: state.is_valid(),
            is_dirty: state.fields.is_dirty(),
            submitted: state.submitted,
            submit_lock: state.lock,
            submission_failed: state.submission_failed,
            submit_count: state.submit_count,
            form_errors: state.form_errors.clone(),
            field_meta,
        })
    }

    /// Loads an entity as the new pristine state of the form.
    pub fn load_data<T: FormData>(&self, data: &T) -> FormResult<()> {
        let errors = {
            let mut state = write_lock(&self.state, "loading form data")?;
            for (path, value) in data.to_values() {
                state
                    .fields
                    .field_mut(&path)
                    .ok_or_else(|| FormError::UnknownField(path.to_string()))?
                    .load(value);
            }
            revalidate_all(&mut state, self.cross_field.as_deref(), false);
            collect_errors(&state.fields)
        };
        self.channels.publish_all(errors, false);
        Ok(())
    }

    pub fn data<T: FormData>(&self) -> FormResult<T> {
        T::from_values(&self.values()?)
    }

    /// Tears the form down: closes every error stream and makes any pending
    /// submission drop its response.
    pub fn dispose(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "disposing form")?;
            if state.disposed {
                return Ok(());
            }
            state.disposed = true;
        }
        self.channels.close();
        debug!(form = %self.id, "form disposed");
        Ok(())
    }

    pub fn is_disposed(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading disposed flag")?.disposed)
    }
}

/// Full validity pass. `force` also marks every field touched and dirty, as a
/// submit attempt does.
fn revalidate_all(
    state: &mut FormState,
    cross_field: Option<&dyn CrossFieldValidator>,
    force: bool,
) -> bool {
    state.fields.visit_mut(&mut |_, field| {
        if force {
            field.touched = true;
            field.dirty = true;
        }
        field.run_rules();
    });
    apply_cross_field(state, cross_field);
    state.is_valid()
}

fn apply_cross_field(state: &mut FormState, cross_field: Option<&dyn CrossFieldValidator>) {
    let Some(validator) = cross_field else {
        return;
    };
    for check in validator.validate(&state.fields) {
        if check.fields.is_empty() {
            toggle_code(&mut state.form_errors, &check.code, check.failed);
            continue;
        }
        for path in &check.fields {
            match state.fields.field_mut(path) {
                Some(field) => toggle_code(&mut field.errors, &check.code, check.failed),
                None => warn!(field = %path, code = %check.code, "cross-field check on unknown field"),
            }
        }
    }
}

fn toggle_code(errors: &mut ErrorSet, code: &str, failed: bool) {
    if failed {
        errors.add(code, ErrorParams::new());
    } else {
        errors.remove(code);
    }
}

fn release_after_edit(state: &mut FormState) -> FormResult<bool> {
    if state.lock != SubmitLock::FailedAwaitingEdit {
        return Ok(false);
    }
    transition_lock(state, SubmitLock::Unlocked)?;
    Ok(true)
}

fn collect_errors(fields: &FieldGroup) -> Vec<(FieldKey, ErrorSet)> {
    let mut errors = Vec::new();
    fields.visit(&mut |path, field| errors.push((path.clone(), field.errors().clone())));
    errors
}

pub(super) fn transition_lock(state: &mut FormState, next: SubmitLock) -> FormResult<()> {
    let current = state.lock;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitLock::Unlocked, SubmitLock::InFlight)
            | (SubmitLock::InFlight, SubmitLock::Unlocked)
            | (SubmitLock::InFlight, SubmitLock::FailedAwaitingEdit)
            | (SubmitLock::FailedAwaitingEdit, SubmitLock::Unlocked)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.lock = next;
    Ok(())
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
