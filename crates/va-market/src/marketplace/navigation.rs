use serde::Serialize;
use tracing::debug;

use super::domain::Session;
use super::session::{SessionSnapshot, SessionSubscription};

/// The four pages of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Landing,
    Login,
    Account,
    Jobs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Public,
    AnonymousOnly,
    AuthenticatedOnly,
}

impl View {
    pub fn path(&self) -> &'static str {
        match self {
            View::Landing => "/",
            View::Login => "/login",
            View::Account => "/account",
            View::Jobs => "/jobs",
        }
    }

    pub fn from_path(path: &str) -> Option<View> {
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Some(View::Landing),
            "/login" => Some(View::Login),
            "/account" => Some(View::Account),
            "/jobs" => Some(View::Jobs),
            _ => None,
        }
    }

    fn access(&self) -> Access {
        match self {
            View::Landing => Access::Public,
            View::Login => Access::AnonymousOnly,
            View::Account | View::Jobs => Access::AuthenticatedOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterState {
    Unknown,
    Anonymous,
    Authenticated(Session),
}

impl RouterState {
    fn label(&self) -> &'static str {
        match self {
            RouterState::Unknown => "unknown",
            RouterState::Anonymous => "anonymous",
            RouterState::Authenticated(_) => "authenticated",
        }
    }
}

impl From<&SessionSnapshot> for RouterState {
    fn from(snapshot: &SessionSnapshot) -> Self {
        match snapshot {
            SessionSnapshot::Unknown => RouterState::Unknown,
            SessionSnapshot::Resolved { session: None, .. } => RouterState::Anonymous,
            SessionSnapshot::Resolved {
                session: Some(session),
                ..
            } => RouterState::Authenticated(session.clone()),
        }
    }
}

/// Outcome of resolving a page against the current router state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Render(View),
    Redirect(View),
    /// The initial session check has not finished.
    Loading,
    NotFound,
}

/// Pure routing rule for one state and page.
pub fn decide(state: &RouterState, view: View) -> Navigation {
    match (view.access(), state) {
        (Access::Public, _) => Navigation::Render(view),
        (_, RouterState::Unknown) => Navigation::Loading,
        (Access::AnonymousOnly, RouterState::Anonymous) => Navigation::Render(view),
        (Access::AnonymousOnly, RouterState::Authenticated(_)) => Navigation::Redirect(View::Jobs),
        (Access::AuthenticatedOnly, RouterState::Authenticated(_)) => Navigation::Render(view),
        (Access::AuthenticatedOnly, RouterState::Anonymous) => Navigation::Redirect(View::Login),
    }
}

/// Session-driven page router.
///
/// Subscribes to the session context once, on construction, and releases the
/// subscription when dropped. Pending session changes are applied before every
/// resolution, so a change published before a request is always observed by it.
pub struct ViewRouter {
    subscription: SessionSubscription,
    state: RouterState,
}

impl ViewRouter {
    pub fn new(subscription: SessionSubscription) -> Self {
        let state = RouterState::from(&subscription.snapshot());
        Self {
            subscription,
            state,
        }
    }

    pub fn state(&self) -> &RouterState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            RouterState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// Apply any session change that arrived since the last call.
    pub fn sync(&mut self) -> bool {
        match self.subscription.take_update() {
            Some(snapshot) => {
                self.apply(&snapshot);
                true
            }
            None => false,
        }
    }

    /// Wait for the next session change and apply it. `None` once the context is gone.
    pub async fn next_transition(&mut self) -> Option<&RouterState> {
        let snapshot = self.subscription.changed().await?;
        self.apply(&snapshot);
        Some(&self.state)
    }

    pub fn resolve(&mut self, view: View) -> Navigation {
        self.sync();
        decide(&self.state, view)
    }

    pub fn resolve_path(&mut self, path: &str) -> Navigation {
        match View::from_path(path) {
            Some(view) => self.resolve(view),
            None => Navigation::NotFound,
        }
    }

    fn apply(&mut self, snapshot: &SessionSnapshot) {
        let next = RouterState::from(snapshot);
        if next.label() != self.state.label() {
            debug!(from = self.state.label(), to = next.label(), "router state changed");
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_round_trip_through_views() {
        for view in [View::Landing, View::Login, View::Account, View::Jobs] {
            assert_eq!(View::from_path(view.path()), Some(view));
        }
        assert_eq!(View::from_path("/jobs/"), Some(View::Jobs));
        assert_eq!(View::from_path("/admin"), None);
    }

    #[test]
    fn landing_is_always_reachable() {
        assert_eq!(
            decide(&RouterState::Unknown, View::Landing),
            Navigation::Render(View::Landing)
        );
        assert_eq!(
            decide(&RouterState::Anonymous, View::Landing),
            Navigation::Render(View::Landing)
        );
    }

    #[test]
    fn guarded_views_wait_for_the_initial_check() {
        for view in [View::Login, View::Account, View::Jobs] {
            assert_eq!(decide(&RouterState::Unknown, view), Navigation::Loading);
        }
    }

    #[test]
    fn anonymous_visitors_are_sent_to_login() {
        assert_eq!(
            decide(&RouterState::Anonymous, View::Jobs),
            Navigation::Redirect(View::Login)
        );
        assert_eq!(
            decide(&RouterState::Anonymous, View::Account),
            Navigation::Redirect(View::Login)
        );
        assert_eq!(
            decide(&RouterState::Anonymous, View::Login),
            Navigation::Render(View::Login)
        );
    }
}
