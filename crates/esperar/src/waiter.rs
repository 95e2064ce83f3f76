//! Element waits for page objects and test bodies.
//!
//! [`Waiter`] binds a [`Poller`] to a search context and exposes each
//! predicate in several shapes:
//!
//! | Shape | Example | On timeout |
//! |---|---|---|
//! | explicit budget | `visible_after(&sel, 5)` | `Err(Timeout)` |
//! | default budget | `visible(&sel)` | `Err(Timeout)` |
//! | boolean | `is_visible_after(&sel, 5)` | `Ok(false)` |
//! | immediate | `is_visible_now(&sel)` | `Ok(false)` |
//! | plural | `all_visible_after(&sel, 5)` | `Err(Timeout)` |
//!
//! Fatal session errors propagate from every shape.

use crate::conditions::{Absent, Clickable, ContainsText, NotMoving, NotVisible, Present, Visible};
use crate::driver::{ElementHandle, SearchContext, Session};
use crate::locator::Selector;
use crate::result::EsperarResult;
use crate::wait::{Condition, Poller, DEFAULT_WAIT_TIMEOUT_SECS};
use std::fmt;
use tracing::debug;

/// Predicate waits against one search context
pub struct Waiter<'s, S: ?Sized> {
    context: &'s S,
    poller: Poller,
    default_timeout_secs: u64,
}

impl<S: ?Sized> fmt::Debug for Waiter<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("poller", &self.poller)
            .field("default_timeout_secs", &self.default_timeout_secs)
            .finish()
    }
}

fn timeout_as_false(result: EsperarResult<()>) -> EsperarResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_timeout() => Ok(false),
        Err(err) => Err(err),
    }
}

impl<'s, S: SearchContext + ?Sized> Waiter<'s, S> {
    /// Wait against `context` with `poller`
    #[must_use]
    pub const fn new(context: &'s S, poller: Poller) -> Self {
        Self {
            context,
            poller,
            default_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
        }
    }

    /// Budget used by the variants without an explicit timeout
    #[must_use]
    pub const fn with_default_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    /// Budget used by the variants without an explicit timeout
    #[must_use]
    pub const fn default_timeout_secs(&self) -> u64 {
        self.default_timeout_secs
    }

    /// Context searched on each attempt
    #[must_use]
    pub const fn context(&self) -> &'s S {
        self.context
    }

    /// Run an arbitrary condition
    ///
    /// # Errors
    ///
    /// Timeout or fatal session error from the poller.
    pub fn until<C: Condition>(
        &self,
        selector: &Selector,
        condition: &C,
        timeout_secs: u64,
    ) -> EsperarResult<C::Output> {
        self.poller
            .poll(self.context, selector, condition, timeout_secs)
            .map(|waited| waited.value)
    }

    // =========================================================================
    // SINGULAR
    // =========================================================================

    /// First match, once any exists
    pub fn present_after(&self, selector: &Selector, secs: u64) -> EsperarResult<ElementHandle> {
        self.until(selector, &Present, secs)
    }

    /// First displayed match
    pub fn visible_after(&self, selector: &Selector, secs: u64) -> EsperarResult<ElementHandle> {
        self.until(selector, &Visible, secs)
    }

    /// First displayed and enabled match
    pub fn clickable_after(&self, selector: &Selector, secs: u64) -> EsperarResult<ElementHandle> {
        self.until(selector, &Clickable, secs)
    }

    /// First match once it has stopped moving
    pub fn not_moving_after(&self, selector: &Selector, secs: u64) -> EsperarResult<ElementHandle> {
        self.until(selector, &NotMoving, secs)
    }

    /// First match once its effective text contains `text`
    pub fn containing_after(
        &self,
        selector: &Selector,
        text: &str,
        secs: u64,
    ) -> EsperarResult<ElementHandle> {
        self.until(selector, &ContainsText::new(text), secs)
    }

    /// Succeeds once nothing matches
    pub fn absent_after(&self, selector: &Selector, secs: u64) -> EsperarResult<()> {
        self.until(selector, &Absent, secs)
    }

    /// Succeeds once no match is displayed
    pub fn not_visible_after(&self, selector: &Selector, secs: u64) -> EsperarResult<()> {
        self.until(selector, &NotVisible, secs)
    }

    /// [`Self::present_after`] with the default budget
    pub fn present(&self, selector: &Selector) -> EsperarResult<ElementHandle> {
        self.present_after(selector, self.default_timeout_secs)
    }

    /// [`Self::visible_after`] with the default budget
    pub fn visible(&self, selector: &Selector) -> EsperarResult<ElementHandle> {
        self.visible_after(selector, self.default_timeout_secs)
    }

    /// [`Self::clickable_after`] with the default budget
    pub fn clickable(&self, selector: &Selector) -> EsperarResult<ElementHandle> {
        self.clickable_after(selector, self.default_timeout_secs)
    }

    /// [`Self::not_moving_after`] with the default budget
    pub fn not_moving(&self, selector: &Selector) -> EsperarResult<ElementHandle> {
        self.not_moving_after(selector, self.default_timeout_secs)
    }

    /// [`Self::containing_after`] with the default budget
    pub fn containing(&self, selector: &Selector, text: &str) -> EsperarResult<ElementHandle> {
        self.containing_after(selector, text, self.default_timeout_secs)
    }

    /// [`Self::absent_after`] with the default budget
    pub fn absent(&self, selector: &Selector) -> EsperarResult<()> {
        self.absent_after(selector, self.default_timeout_secs)
    }

    /// [`Self::not_visible_after`] with the default budget
    pub fn not_visible(&self, selector: &Selector) -> EsperarResult<()> {
        self.not_visible_after(selector, self.default_timeout_secs)
    }

    // =========================================================================
    // PLURAL
    // =========================================================================

    // The re-query may see a different set than the proof step did.
    fn all_after(
        &self,
        selector: &Selector,
        proof: EsperarResult<ElementHandle>,
        keep: fn(&ElementHandle) -> bool,
    ) -> EsperarResult<Vec<ElementHandle>> {
        proof?;
        let children = self.context.find_elements(selector)?;
        Ok(children.into_iter().filter(|el| keep(el)).collect())
    }

    /// Every match, once at least one exists
    pub fn all_present_after(
        &self,
        selector: &Selector,
        secs: u64,
    ) -> EsperarResult<Vec<ElementHandle>> {
        self.all_after(selector, self.present_after(selector, secs), |_| true)
    }

    /// Every displayed match, once at least one is displayed
    pub fn all_visible_after(
        &self,
        selector: &Selector,
        secs: u64,
    ) -> EsperarResult<Vec<ElementHandle>> {
        self.all_after(
            selector,
            self.visible_after(selector, secs),
            ElementHandle::is_displayed,
        )
    }

    /// Every clickable match, once at least one is clickable
    pub fn all_clickable_after(
        &self,
        selector: &Selector,
        secs: u64,
    ) -> EsperarResult<Vec<ElementHandle>> {
        self.all_after(
            selector,
            self.clickable_after(selector, secs),
            ElementHandle::is_clickable,
        )
    }

    /// [`Self::all_present_after`] with the default budget
    pub fn all_present(&self, selector: &Selector) -> EsperarResult<Vec<ElementHandle>> {
        self.all_present_after(selector, self.default_timeout_secs)
    }

    /// [`Self::all_visible_after`] with the default budget
    pub fn all_visible(&self, selector: &Selector) -> EsperarResult<Vec<ElementHandle>> {
        self.all_visible_after(selector, self.default_timeout_secs)
    }

    /// [`Self::all_clickable_after`] with the default budget
    pub fn all_clickable(&self, selector: &Selector) -> EsperarResult<Vec<ElementHandle>> {
        self.all_clickable_after(selector, self.default_timeout_secs)
    }

    // =========================================================================
    // BOOLEAN
    // =========================================================================

    /// Whether a match appears within `secs`
    pub fn is_present_after(&self, selector: &Selector, secs: u64) -> EsperarResult<bool> {
        timeout_as_false(self.present_after(selector, secs).map(drop))
    }

    /// Whether a match is displayed within `secs`
    pub fn is_visible_after(&self, selector: &Selector, secs: u64) -> EsperarResult<bool> {
        timeout_as_false(self.visible_after(selector, secs).map(drop))
    }

    /// Whether a match is clickable within `secs`
    pub fn is_clickable_after(&self, selector: &Selector, secs: u64) -> EsperarResult<bool> {
        timeout_as_false(self.clickable_after(selector, secs).map(drop))
    }

    /// Whether every match disappears within `secs`
    pub fn is_absent_after(&self, selector: &Selector, secs: u64) -> EsperarResult<bool> {
        timeout_as_false(self.absent_after(selector, secs))
    }

    /// Whether a match exists right now
    pub fn is_present_now(&self, selector: &Selector) -> EsperarResult<bool> {
        self.is_present_after(selector, 0)
    }

    /// Whether a match is displayed right now
    pub fn is_visible_now(&self, selector: &Selector) -> EsperarResult<bool> {
        self.is_visible_after(selector, 0)
    }

    /// Whether a match is clickable right now
    pub fn is_clickable_now(&self, selector: &Selector) -> EsperarResult<bool> {
        self.is_clickable_after(selector, 0)
    }

    /// Whether nothing matches right now
    pub fn is_absent_now(&self, selector: &Selector) -> EsperarResult<bool> {
        self.is_absent_after(selector, 0)
    }
}

// =============================================================================
// COMPOUND
// =============================================================================

impl<S: Session + ?Sized> Waiter<'_, S> {
    /// Wait visible, then move the pointer onto it
    pub fn move_to_after(&self, selector: &Selector, secs: u64) -> EsperarResult<ElementHandle> {
        let element = self.visible_after(selector, secs)?;
        self.context.move_to(&element)?;
        Ok(element)
    }

    /// Move onto `move_target`, then click `click_target`.
    ///
    /// Each wait gets the full `secs` budget.
    pub fn move_to_and_click_after(
        &self,
        move_target: &Selector,
        click_target: &Selector,
        secs: u64,
    ) -> EsperarResult<ElementHandle> {
        self.move_to_after(move_target, secs)?;
        let element = self.clickable_after(click_target, secs)?;
        self.context.click(&element)?;
        debug!(%move_target, %click_target, "moved and clicked");
        Ok(element)
    }

    /// Click `click_target`, then wait for `wait_target` to be present
    pub fn click_and_present_after(
        &self,
        click_target: &Selector,
        wait_target: &Selector,
        secs: u64,
    ) -> EsperarResult<ElementHandle> {
        let element = self.clickable_after(click_target, secs)?;
        self.context.click(&element)?;
        self.present_after(wait_target, secs)
    }

    /// Click `selector`, then type `keys` into it
    pub fn click_and_send_keys_after(
        &self,
        selector: &Selector,
        keys: &str,
        secs: u64,
    ) -> EsperarResult<ElementHandle> {
        let element = self.clickable_after(selector, secs)?;
        self.context.click(&element)?;
        self.context.send_keys(&element, keys)?;
        Ok(element)
    }

    /// Clickable match, clicked
    pub fn click_after(&self, selector: &Selector, secs: u64) -> EsperarResult<ElementHandle> {
        let element = self.clickable_after(selector, secs)?;
        self.context.click(&element)?;
        Ok(element)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FakeClock};
    use crate::driver::MockSession;
    use std::time::Duration;

    fn setup() -> (FakeClock, Poller) {
        let clock = FakeClock::new();
        (clock.clone(), Poller::new(clock.shared()))
    }

    fn button(id: &str) -> ElementHandle {
        ElementHandle::new(id, "button")
    }

    mod singular_tests {
        use super::*;

        #[test]
        fn test_default_timeout_used() {
            let (clock, poller) = setup();
            let session = MockSession::new("s").with_clock(clock.shared());
            let waiter = Waiter::new(&session, poller).with_default_timeout(4);
            let err = waiter.visible(&Selector::css("#x")).unwrap_err();
            assert!(err.to_string().ends_with("after 4 seconds"));
            assert_eq!(clock.now(), Duration::from_secs(4));
        }

        #[test]
        fn test_containing_reads_input_value() {
            let (clock, poller) = setup();
            let sel = Selector::name("q");
            let session = MockSession::new("s").with_clock(clock.shared()).with_elements(
                sel.clone(),
                vec![ElementHandle::new("q", "input").with_value("foo")],
            );
            let waiter = Waiter::new(&session, poller);
            assert_eq!(waiter.containing_after(&sel, "foo", 1).unwrap().id, "q");
        }

        #[test]
        fn test_absent_and_not_visible() {
            let (clock, poller) = setup();
            let sel = Selector::css(".spinner");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_elements(sel.clone(), vec![button("sp").displayed(false)])
                .with_elements_at(sel.clone(), Duration::from_secs(1), vec![]);
            let waiter = Waiter::new(&session, poller);
            waiter.not_visible_after(&sel, 0).unwrap();
            waiter.absent_after(&sel, 2).unwrap();
        }
    }

    mod plural_tests {
        use super::*;

        #[test]
        fn test_all_visible_filters_hidden() {
            let (clock, poller) = setup();
            let sel = Selector::css("li");
            let session = MockSession::new("s").with_clock(clock.shared()).with_elements(
                sel.clone(),
                vec![button("a"), button("b").displayed(false), button("c")],
            );
            let waiter = Waiter::new(&session, poller);
            let ids: Vec<_> = waiter
                .all_visible_after(&sel, 1)
                .unwrap()
                .into_iter()
                .map(|e| e.id)
                .collect();
            assert_eq!(ids, vec!["a", "c"]);
        }

        #[test]
        fn test_requery_can_differ_from_proof() {
            let (_clock, poller) = setup();
            let sel = Selector::css("li");
            let session = MockSession::new("s").with_sequence(
                sel.clone(),
                vec![
                    vec![button("a")],
                    vec![button("a"), button("b"), button("c").enabled(false)],
                ],
            );
            let waiter = Waiter::new(&session, poller);
            let all = waiter.all_clickable_after(&sel, 1).unwrap();
            assert_eq!(all.len(), 2);
            assert_eq!(session.find_count(&sel), 2);
        }

        #[test]
        fn test_all_present_times_out_when_empty() {
            let (clock, poller) = setup();
            let session = MockSession::new("s").with_clock(clock.shared());
            let waiter = Waiter::new(&session, poller);
            assert!(waiter
                .all_present_after(&Selector::css("li"), 1)
                .unwrap_err()
                .is_timeout());
        }
    }

    mod boolean_tests {
        use super::*;

        #[test]
        fn test_timeout_maps_to_false() {
            let (clock, poller) = setup();
            let session = MockSession::new("s").with_clock(clock.shared());
            let waiter = Waiter::new(&session, poller);
            assert!(!waiter.is_present_after(&Selector::css("#x"), 2).unwrap());
            assert!(waiter.is_absent_now(&Selector::css("#x")).unwrap());
        }

        #[test]
        fn test_now_variants_poll_once() {
            let (clock, poller) = setup();
            let sel = Selector::css("#x");
            let session = MockSession::new("s").with_clock(clock.shared());
            let waiter = Waiter::new(&session, poller);
            assert!(!waiter.is_visible_now(&sel).unwrap());
            assert!(!waiter.is_clickable_now(&sel).unwrap());
            assert!(!waiter.is_present_now(&sel).unwrap());
            assert_eq!(session.find_count(&sel), 3);
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_fatal_still_propagates() {
            let (clock, poller) = setup();
            let sel = Selector::css("#x");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_failure(sel.clone(), "gone");
            let waiter = Waiter::new(&session, poller);
            assert!(waiter.is_present_after(&sel, 5).is_err());
        }
    }

    mod compound_tests {
        use super::*;

        #[test]
        fn test_move_to_and_click_uses_two_budgets() {
            let (clock, poller) = setup();
            let menu = Selector::css("#menu");
            let item = Selector::css("#item");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_elements(menu.clone(), vec![button("menu")])
                .with_elements_at(item.clone(), Duration::from_secs(2), vec![button("item")]);
            let waiter = Waiter::new(&session, poller);
            let clicked = waiter.move_to_and_click_after(&menu, &item, 2).unwrap();
            assert_eq!(clicked.id, "item");
            assert!(session.was_called("move_to:menu"));
            assert!(session.was_called("click:item"));
        }

        #[test]
        fn test_click_and_present() {
            let (clock, poller) = setup();
            let open = Selector::id("open");
            let dialog = Selector::id("dialog");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_elements(open.clone(), vec![button("open")])
                .with_elements_at(dialog.clone(), Duration::from_secs(1), vec![button("dialog")]);
            let waiter = Waiter::new(&session, poller);
            assert_eq!(
                waiter.click_and_present_after(&open, &dialog, 3).unwrap().id,
                "dialog"
            );
            assert_eq!(session.history()[1], "click:open");
        }

        #[test]
        fn test_click_and_send_keys() {
            let (clock, poller) = setup();
            let field = Selector::name("email");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_elements(field.clone(), vec![ElementHandle::new("email", "input")]);
            let waiter = Waiter::new(&session, poller);
            waiter.click_and_send_keys_after(&field, "a@b.c", 1).unwrap();
            assert!(session.was_called("send_keys:email:a@b.c"));
        }

        #[test]
        fn test_click_never_issued_when_wait_fails() {
            let (clock, poller) = setup();
            let sel = Selector::id("save");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_elements(sel.clone(), vec![button("save").enabled(false)]);
            let waiter = Waiter::new(&session, poller);
            let err = waiter.click_after(&sel, 1).unwrap_err();
            assert_eq!(err.to_string(), "Element id=save is not clickable after 1 seconds");
            assert!(!session.was_called("click"));
        }
    }
}
