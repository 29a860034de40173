use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::future;
use futures::stream::{self, BoxStream, PollNext, Stream, StreamExt};

use super::channels::FormNotice;
use super::errors::{ErrorParams, ErrorSet};

/// Namespace under which error codes are looked up.
pub const VALIDATION_PREFIX: &str = "validation.";

/// Translates a message key with named parameters.
pub trait Localize {
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String;
}

impl<F> Localize for F
where
    F: Fn(&str, &[(&str, &str)]) -> String,
{
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String {
        (self)(key, params)
    }
}

fn translate_code<L: Localize + ?Sized>(localize: &L, code: &str, params: &ErrorParams) -> String {
    let params = params
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect::<Vec<_>>();
    localize.translate(&format!("{VALIDATION_PREFIX}{code}"), &params)
}

/// One line per error code, in insertion order.
pub fn render<L: Localize + ?Sized>(errors: &ErrorSet, localize: &L) -> String {
    errors
        .iter()
        .map(|(code, params)| translate_code(localize, code, params))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_notices<L: Localize + ?Sized>(notices: &[FormNotice], localize: &L) -> String {
    notices
        .iter()
        .map(|notice| translate_code(localize, &notice.i18n_key, &notice.params))
        .collect::<Vec<_>>()
        .join("\n")
}

enum DisplayEvent {
    Errors(ErrorSet),
    ErrorsClosed,
    LanguageChanged,
}

/// Rendered error message of one field.
///
/// Yields a new message whenever the field's error set changes, and again for
/// the last known set whenever `language_changes` fires. Language changes
/// never trigger validation. Ends when the error stream ends.
pub struct ErrorDisplay<'a, L> {
    events: BoxStream<'a, DisplayEvent>,
    localize: L,
    last: Option<ErrorSet>,
    finished: bool,
}

impl<'a, L: Localize> ErrorDisplay<'a, L> {
    pub fn new<E, C>(errors: E, language_changes: C, localize: L) -> Self
    where
        E: Stream<Item = ErrorSet> + Send + 'a,
        C: Stream + Send + 'a,
    {
        let errors = errors
            .map(DisplayEvent::Errors)
            .chain(stream::once(future::ready(DisplayEvent::ErrorsClosed)));
        let languages = language_changes.map(|_| DisplayEvent::LanguageChanged);
        // Error updates win over a simultaneous language change.
        let events = stream::select_with_strategy(errors, languages, |_: &mut ()| PollNext::Left);
        Self {
            events: events.boxed(),
            localize,
            last: None,
            finished: false,
        }
    }

    pub fn last_errors(&self) -> Option<&ErrorSet> {
        self.last.as_ref()
    }
}

impl<L: Localize + Unpin> Stream for ErrorDisplay<'_, L> {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();
        while !this.finished {
            match ready!(this.events.poll_next_unpin(cx)) {
                Some(DisplayEvent::Errors(errors)) => {
                    let message = render(&errors, &this.localize);
                    this.last = Some(errors);
                    return Poll::Ready(Some(message));
                }
                Some(DisplayEvent::LanguageChanged) => {
                    if let Some(errors) = &this.last {
                        return Poll::Ready(Some(render(errors, &this.localize)));
                    }
                }
                Some(DisplayEvent::ErrorsClosed) | None => this.finished = true,
            }
        }
        Poll::Ready(None)
    }
}
