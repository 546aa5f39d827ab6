//! Questions the engine asks the user.
//!
//! The presentation layer implements [`Prompter`]. Calls block until the
//! user answers, so implementations are invoked from the orchestrator's
//! task, never from inside a gateway call.

pub trait Prompter: Send + Sync {
    /// Yes/no question. `false` means the user backed out.
    fn confirm(&self, title: &str, body: &str) -> bool;

    /// Pick one of `options`; `None` when the menu was dismissed.
    fn choose(&self, title: &str, options: &[String]) -> Option<usize>;
}
