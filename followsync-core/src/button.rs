//! Follow Button
//!
//! The follow/unfollow control for one author. Activation writes the
//! opposite of the current value into the store right away, then asks the
//! backend to make it true. The server's answer confirms the value; a
//! failure puts back exactly the value captured before the toggle.
//!
//! While a request is out the button is `Pending` and ignores further
//! activations, so one button never has two mutations in flight.
//!
//! A button bound to the viewer's own id renders nothing and ignores input.
//!
//! An owner that must react to the server accepting a toggle (a feed of
//! followed authors, say) registers [`FollowButton::on_confirmed`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::FollowMutations;
use crate::error::FollowError;
use crate::model::{AuthorId, FollowResult};
use crate::reactive::Subscription;
use crate::store::{FollowStatusStore, Resolution, Ticket};

/// Direction of an in-flight toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Becoming following.
    Following,
    /// Becoming not-following.
    Unfollowing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    NotFollowing,
    Following,
    Pending(Direction),
}

/// What to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonView {
    pub state: ButtonState,
    pub label: &'static str,
    pub disabled: bool,
}

impl ButtonView {
    fn from_state(state: ButtonState) -> Self {
        let label = match state {
            ButtonState::NotFollowing => "Follow",
            ButtonState::Following => "Following",
            ButtonState::Pending(_) => "...",
        };
        Self {
            state,
            label,
            disabled: matches!(state, ButtonState::Pending(_)),
        }
    }
}

/// Outcome of [`FollowButton::activate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// Nothing was sent: the button is pending or bound to the viewer.
    Ignored,
    /// The server confirmed the new value and the store holds it.
    Confirmed(bool),
    /// The server accepted the request, but a newer toggle for the same
    /// author owns the store entry now.
    Superseded,
}

#[derive(Debug)]
struct Local {
    following: bool,
    pending: Option<Direction>,
}

pub struct FollowButton {
    author: AuthorId,
    bound_to_self: bool,
    store: FollowStatusStore,
    mutations: Arc<dyn FollowMutations>,
    local: Arc<Mutex<Local>>,
    on_confirmed: Option<ConfirmHook>,
    _subscription: Option<Subscription>,
}

type ConfirmHook = Arc<dyn Fn(&FollowResult) + Send + Sync>;

impl FollowButton {
    /// Mount a button for `author` as seen by `viewer`.
    ///
    /// The initial value is read from the store once; afterwards the button
    /// follows every store change for its author.
    pub fn new(
        author: AuthorId,
        viewer: Option<&AuthorId>,
        store: FollowStatusStore,
        mutations: Arc<dyn FollowMutations>,
    ) -> Self {
        let bound_to_self = viewer == Some(&author);
        let local = Arc::new(Mutex::new(Local {
            following: !bound_to_self && store.get(&author),
            pending: None,
        }));

        let subscription = (!bound_to_self).then(|| {
            let local = Arc::clone(&local);
            let reader = store.clone();
            let key = author.clone();
            store.subscribe(&author, move |event| {
                if event.touches(&key) {
                    local.lock().following = reader.get(&key);
                }
            })
        });

        Self {
            author,
            bound_to_self,
            store,
            mutations,
            local,
            on_confirmed: None,
            _subscription: subscription,
        }
    }

    /// Call `hook` whenever the server accepts a toggle from this button,
    /// including one a newer toggle has since superseded.
    pub fn on_confirmed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FollowResult) + Send + Sync + 'static,
    {
        self.on_confirmed = Some(Arc::new(hook));
        self
    }

    pub fn author(&self) -> &AuthorId {
        &self.author
    }

    pub fn is_following(&self) -> bool {
        self.local.lock().following
    }

    pub fn is_pending(&self) -> bool {
        self.local.lock().pending.is_some()
    }

    pub fn state(&self) -> ButtonState {
        let local = self.local.lock();
        match (local.pending, local.following) {
            (Some(direction), _) => ButtonState::Pending(direction),
            (None, true) => ButtonState::Following,
            (None, false) => ButtonState::NotFollowing,
        }
    }

    /// `None` for a button bound to the viewer.
    pub fn view(&self) -> Option<ButtonView> {
        if self.bound_to_self {
            return None;
        }
        Some(ButtonView::from_state(self.state()))
    }

    /// Toggle the follow state.
    ///
    /// On failure the store and the button already show the pre-toggle value
    /// when the error is returned. Dropping the future mid-request rolls back
    /// the same way.
    pub async fn activate(&self) -> Result<Toggle, FollowError> {
        if self.bound_to_self {
            return Ok(Toggle::Ignored);
        }

        let previous = {
            let mut local = self.local.lock();
            if local.pending.is_some() {
                debug!(author = %self.author, "toggle already in flight, ignoring");
                return Ok(Toggle::Ignored);
            }
            let previous = local.following;
            local.pending = Some(if previous {
                Direction::Unfollowing
            } else {
                Direction::Following
            });
            local.following = !previous;
            previous
        };
        let target = !previous;

        let mut guard = PendingGuard {
            button: self,
            ticket: Some(self.store.begin(&self.author)),
            previous,
        };
        self.store.set(&self.author, target);

        let outcome = if target {
            self.mutations.follow(&self.author).await
        } else {
            self.mutations.unfollow(&self.author).await
        };

        match outcome {
            Ok(confirmed) => {
                let following = confirmed.is_following;
                let resolution = guard.finish(following);
                if let Some(hook) = &self.on_confirmed {
                    hook(&confirmed);
                }
                match resolution {
                    Resolution::Applied => Ok(Toggle::Confirmed(following)),
                    Resolution::Stale => Ok(Toggle::Superseded),
                }
            }
            Err(source) => {
                warn!(author = %self.author, error = %source, "follow toggle failed, rolling back");
                guard.finish(previous);
                Err(if target {
                    FollowError::Follow {
                        author: self.author.clone(),
                        source,
                    }
                } else {
                    FollowError::Unfollow {
                        author: self.author.clone(),
                        source,
                    }
                })
            }
        }
    }

    fn settle(&self) {
        let following = self.store.get(&self.author);
        let mut local = self.local.lock();
        local.pending = None;
        local.following = following;
    }
}

/// Clears `pending` however `activate` ends, rolling back if it ends before
/// an outcome was applied.
struct PendingGuard<'a> {
    button: &'a FollowButton,
    ticket: Option<Ticket>,
    previous: bool,
}

impl PendingGuard<'_> {
    fn finish(&mut self, following: bool) -> Resolution {
        let resolution = match self.ticket.take() {
            Some(ticket) => self.button.store.resolve(&ticket, following),
            None => Resolution::Stale,
        };
        self.button.settle();
        resolution
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.ticket.is_some() {
            debug!(author = %self.button.author, "toggle dropped in flight, rolling back");
            self.finish(self.previous);
        }
    }
}

impl fmt::Debug for FollowButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FollowButton")
            .field("author", &self.author)
            .field("bound_to_self", &self.bound_to_self)
            .field("on_confirmed", &self.on_confirmed.is_some())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendResult;
    use crate::error::BackendError;
    use crate::model::FollowResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Answers every request after `release` is notified.
    #[derive(Default)]
    struct GatedMutations {
        release: Notify,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl GatedMutations {
        async fn answer(&self, author: &AuthorId, following: bool) -> BackendResult<FollowResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(BackendError::Transport("offline".into()));
            }
            Ok(FollowResult {
                author_id: author.clone(),
                is_following: following,
            })
        }
    }

    #[async_trait]
    impl FollowMutations for GatedMutations {
        async fn follow(&self, author: &AuthorId) -> BackendResult<FollowResult> {
            self.answer(author, true).await
        }

        async fn unfollow(&self, author: &AuthorId) -> BackendResult<FollowResult> {
            self.answer(author, false).await
        }
    }

    fn id(s: &str) -> AuthorId {
        AuthorId::from(s)
    }

    fn button(store: &FollowStatusStore, mutations: &Arc<GatedMutations>, author: &str) -> FollowButton {
        FollowButton::new(id(author), Some(&id("V")), store.clone(), mutations.clone())
    }

    #[tokio::test]
    async fn self_bound_button_renders_nothing_and_ignores_input() {
        let store = FollowStatusStore::for_viewer("V");
        let mutations = Arc::new(GatedMutations::default());
        let button = button(&store, &mutations, "V");

        assert_eq!(button.view(), None);
        assert_eq!(button.activate().await, Ok(Toggle::Ignored));
        assert_eq!(mutations.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn initial_state_comes_from_store() {
        let store = FollowStatusStore::for_viewer("V");
        store.seed([(id("A"), true)]);
        let mutations = Arc::new(GatedMutations::default());

        assert_eq!(button(&store, &mutations, "A").state(), ButtonState::Following);
        assert_eq!(button(&store, &mutations, "B").state(), ButtonState::NotFollowing);
    }

    #[tokio::test]
    async fn optimistic_then_confirmed() {
        let store = FollowStatusStore::for_viewer("V");
        let mutations = Arc::new(GatedMutations::default());
        let button = Arc::new(button(&store, &mutations, "B"));

        let task = tokio::spawn({
            let button = button.clone();
            async move { button.activate().await }
        });
        while mutations.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(store.get(&id("B")));
        assert_eq!(button.state(), ButtonState::Pending(Direction::Following));
        let view = button.view().unwrap();
        assert_eq!(view.label, "...");
        assert!(view.disabled);

        mutations.release.notify_one();
        assert_eq!(task.await.unwrap(), Ok(Toggle::Confirmed(true)));
        assert_eq!(button.view().unwrap().label, "Following");
        assert!(store.get(&id("B")));
    }

    #[tokio::test]
    async fn failure_rolls_back_exactly() {
        let store = FollowStatusStore::for_viewer("V");
        store.seed([(id("A"), true)]);
        let mutations = Arc::new(GatedMutations::default());
        mutations.fail.store(true, Ordering::SeqCst);
        mutations.release.notify_one();
        let button = button(&store, &mutations, "A");

        let before = store.snapshot();
        let result = button.activate().await;

        assert!(matches!(result, Err(FollowError::Unfollow { .. })));
        assert_eq!(result.unwrap_err().author(), &id("A"));
        assert_eq!(store.snapshot(), before);
        assert_eq!(button.state(), ButtonState::Following);
    }

    #[tokio::test]
    async fn activation_while_pending_is_a_no_op() {
        let store = FollowStatusStore::for_viewer("V");
        let mutations = Arc::new(GatedMutations::default());
        let button = Arc::new(button(&store, &mutations, "B"));

        let task = tokio::spawn({
            let button = button.clone();
            async move { button.activate().await }
        });
        while mutations.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(button.activate().await, Ok(Toggle::Ignored));
        assert_eq!(button.activate().await, Ok(Toggle::Ignored));

        mutations.release.notify_one();
        task.await.unwrap().unwrap();
        assert_eq!(mutations.calls.load(Ordering::SeqCst), 1);
        assert!(!button.is_pending());
    }

    #[tokio::test]
    async fn sibling_buttons_converge() {
        let store = FollowStatusStore::for_viewer("V");
        store.seed([(id("B"), false)]);
        let mutations = Arc::new(GatedMutations::default());
        mutations.release.notify_one();
        let first = button(&store, &mutations, "B");
        let second = button(&store, &mutations, "B");

        first.activate().await.unwrap();

        assert!(first.is_following());
        assert!(second.is_following());
        assert_eq!(second.view().unwrap().label, "Following");
    }

    #[tokio::test]
    async fn dropped_toggle_rolls_back() {
        let store = FollowStatusStore::for_viewer("V");
        let mutations = Arc::new(GatedMutations::default());
        let button = button(&store, &mutations, "B");

        {
            let activation = button.activate();
            tokio::pin!(activation);
            let polled = tokio::time::timeout(std::time::Duration::from_millis(10), &mut activation).await;
            assert!(polled.is_err());
            assert!(store.get(&id("B")));
        }

        assert!(!store.get(&id("B")));
        assert!(!button.is_pending());
        assert_eq!(button.state(), ButtonState::NotFollowing);
    }

    #[tokio::test]
    async fn confirm_hook_runs_only_on_server_answers() {
        let store = FollowStatusStore::for_viewer("V");
        let mutations = Arc::new(GatedMutations::default());
        let answers = Arc::new(Mutex::new(Vec::new()));
        let seen = answers.clone();
        let button = button(&store, &mutations, "B")
            .on_confirmed(move |result| seen.lock().push(result.is_following));

        mutations.release.notify_one();
        assert_eq!(button.activate().await, Ok(Toggle::Confirmed(true)));
        assert_eq!(*answers.lock(), vec![true]);

        mutations.fail.store(true, Ordering::SeqCst);
        mutations.release.notify_one();
        assert!(button.activate().await.is_err());
        assert_eq!(*answers.lock(), vec![true]);
    }

    #[tokio::test]
    async fn seed_updates_mounted_button() {
        let store = FollowStatusStore::for_viewer("V");
        let mutations = Arc::new(GatedMutations::default());
        let button = button(&store, &mutations, "A");
        assert!(!button.is_following());

        store.seed([(id("A"), true)]);
        assert!(button.is_following());

        store.clear();
        assert!(!button.is_following());
    }
}
