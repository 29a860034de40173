use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::errors::{ErrorParams, ErrorSet};
use super::field::FieldKey;

/// A form-level message that belongs to no single field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormNotice {
    pub i18n_key: String,
    pub params: ErrorParams,
}

impl FormNotice {
    pub fn new(i18n_key: impl Into<String>, params: ErrorParams) -> Self {
        Self {
            i18n_key: i18n_key.into(),
            params,
        }
    }
}

struct Senders {
    fields: IndexMap<FieldKey, watch::Sender<ErrorSet>>,
    notices: watch::Sender<Vec<FormNotice>>,
}

/// One latest-value error channel per leaf field, plus the form-level notices.
///
/// Subscribers get the current set first, then the newest set after each
/// change; sets published between two polls are skipped. Closing drops every
/// sender, which ends all streams once they have seen the last value.
#[derive(Clone)]
pub struct FieldErrorChannels {
    senders: Arc<RwLock<Option<Senders>>>,
}

impl FieldErrorChannels {
    pub fn new(paths: impl IntoIterator<Item = FieldKey>) -> Self {
        let fields = paths
            .into_iter()
            .map(|path| (path, watch::channel(ErrorSet::new()).0))
            .collect();
        Self {
            senders: Arc::new(RwLock::new(Some(Senders {
                fields,
                notices: watch::channel(Vec::new()).0,
            }))),
        }
    }

    /// Number of open field channels. Zero once closed.
    pub fn len(&self) -> usize {
        self.read().as_ref().map_or(0, |senders| senders.fields.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.read().is_none()
    }

    pub fn subscribe(&self, path: &FieldKey) -> Option<WatchStream<ErrorSet>> {
        let senders = self.read();
        let sender = senders.as_ref()?.fields.get(path)?;
        Some(WatchStream::new(sender.subscribe()))
    }

    pub fn current(&self, path: &FieldKey) -> Option<ErrorSet> {
        let senders = self.read();
        let sender = senders.as_ref()?.fields.get(path)?;
        Some(sender.borrow().clone())
    }

    /// Replaces the field's error set as a whole. Returns `false` for unknown
    /// fields and once closed.
    pub fn publish(&self, path: &FieldKey, errors: ErrorSet) -> bool {
        let senders = self.read();
        match senders.as_ref().and_then(|senders| senders.fields.get(path)) {
            Some(sender) => {
                sender.send_replace(errors);
                true
            }
            None => false,
        }
    }

    /// Publishes a batch of sets. Unchanged sets are skipped unless `force`.
    pub(super) fn publish_all(&self, updates: Vec<(FieldKey, ErrorSet)>, force: bool) {
        let senders = self.read();
        let Some(senders) = senders.as_ref() else {
            return;
        };
        for (path, errors) in updates {
            let Some(sender) = senders.fields.get(&path) else {
                continue;
            };
            if force {
                sender.send_replace(errors);
            } else {
                replace_if_changed(sender, errors);
            }
        }
    }

    pub fn notices(&self) -> Option<WatchStream<Vec<FormNotice>>> {
        let senders = self.read();
        Some(WatchStream::new(senders.as_ref()?.notices.subscribe()))
    }

    pub fn current_notices(&self) -> Vec<FormNotice> {
        self.read()
            .as_ref()
            .map(|senders| senders.notices.borrow().clone())
            .unwrap_or_default()
    }

    pub(super) fn publish_notices(&self, notices: Vec<FormNotice>) {
        if let Some(senders) = self.read().as_ref() {
            replace_if_changed(&senders.notices, notices);
        }
    }

    pub(super) fn close(&self) {
        *self.write() = None;
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Senders>> {
        match self.senders.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Senders>> {
        match self.senders.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn replace_if_changed<T: PartialEq>(sender: &watch::Sender<T>, value: T) -> bool {
    sender.send_if_modified(|current| {
        if *current == value {
            return false;
        }
        *current = value;
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};

    #[test]
    fn unknown_fields_have_no_channel() {
        let channels = FieldErrorChannels::new([FieldKey::new("email")]);
        assert!(channels.subscribe(&FieldKey::new("nope")).is_none());
        assert!(!channels.publish(&FieldKey::new("nope"), ErrorSet::new()));
    }

    #[test]
    fn forced_publish_re_emits_an_unchanged_set() {
        let channels = FieldErrorChannels::new([FieldKey::new("email")]);
        let mut stream = channels
            .subscribe(&FieldKey::new("email"))
            .expect("email channel");
        assert_eq!(stream.next().now_or_never(), Some(Some(ErrorSet::new())));

        channels.publish_all(vec![(FieldKey::new("email"), ErrorSet::new())], false);
        assert_eq!(stream.next().now_or_never(), None);

        channels.publish_all(vec![(FieldKey::new("email"), ErrorSet::new())], true);
        assert_eq!(stream.next().now_or_never(), Some(Some(ErrorSet::new())));
    }

    #[test]
    fn close_ends_field_and_notice_streams() {
        let channels = FieldErrorChannels::new([FieldKey::new("email")]);
        let mut field = channels
            .subscribe(&FieldKey::new("email"))
            .expect("email channel");
        let mut notices = channels.notices().expect("notices channel");
        channels.close();
        assert!(channels.is_closed());
        assert_eq!(channels.len(), 0);

        assert_eq!(field.next().now_or_never(), Some(Some(ErrorSet::new())));
        assert_eq!(field.next().now_or_never(), Some(None));
        assert_eq!(notices.next().now_or_never(), Some(Some(Vec::new())));
        assert_eq!(notices.next().now_or_never(), Some(None));
        assert!(channels.subscribe(&FieldKey::new("email")).is_none());
        assert!(!channels.publish(&FieldKey::new("email"), ErrorSet::new()));
    }

    #[test]
    fn subscriber_sees_only_the_latest_set() {
        let channels = FieldErrorChannels::new([FieldKey::new("email")]);
        let email = FieldKey::new("email");
        let mut stream = channels.subscribe(&email).expect("email channel");
        assert_eq!(stream.next().now_or_never(), Some(Some(ErrorSet::new())));

        channels.publish(&email, ErrorSet::single("a", ErrorParams::new()));
        channels.publish(&email, ErrorSet::single("b", ErrorParams::new()));
        let latest = stream.next().now_or_never().flatten().expect("latest set");
        assert!(latest.contains("b") && !latest.contains("a"));
        assert_eq!(stream.next().now_or_never(), None);
        assert_eq!(channels.current(&email), Some(latest));
    }

    #[test]
    fn notices_skip_unchanged_lists() {
        let channels = FieldErrorChannels::new([FieldKey::new("email")]);
        let mut notices = channels.notices().expect("notices channel");
        assert_eq!(notices.next().now_or_never(), Some(Some(Vec::new())));

        channels.publish_notices(Vec::new());
        assert_eq!(notices.next().now_or_never(), None);

        let quota = vec![FormNotice::new("quotaExceeded", ErrorParams::new())];
        channels.publish_notices(quota.clone());
        assert_eq!(notices.next().now_or_never(), Some(Some(quota.clone())));
        assert_eq!(channels.current_notices(), quota);
    }

    #[test]
    fn pending_subscriber_is_woken_by_publish() {
        let channels = FieldErrorChannels::new([FieldKey::new("email")]);
        let email = FieldKey::new("email");
        let mut stream = channels.subscribe(&email).expect("email channel");
        assert_eq!(stream.next().now_or_never(), Some(Some(ErrorSet::new())));

        let subscriber = std::thread::spawn(move || futures::executor::block_on(stream.next()));
        std::thread::sleep(std::time::Duration::from_millis(20));
        channels.publish(&email, ErrorSet::single("taken", ErrorParams::new()));
        let received = subscriber
            .join()
            .expect("subscriber thread joins")
            .expect("stream open");
        assert!(received.contains("taken"));
    }
}
