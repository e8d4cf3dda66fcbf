use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use serde_json::Value;
use tracing::warn;

use crate::domain::{Condition, FieldDeclaration, Predicate, strict_equals};

/// Whether `declaration` is active against the values of its scope.
///
/// Leaves are always visible; only an enclosing conditional or dynamic section
/// can hide them. Nothing is cached, every call re-evaluates the condition.
pub fn is_visible(declaration: &FieldDeclaration, scope: &Value) -> bool {
    match declaration.condition() {
        Some(condition) => evaluate_condition(declaration.name(), condition, scope),
        None => true,
    }
}

/// Evaluate every gate present on `condition`; all of them must hold.
pub fn evaluate_condition(name: &str, condition: &Condition, scope: &Value) -> bool {
    if let Some(path) = &condition.depends_on {
        let matched = path
            .lookup(scope)
            .is_some_and(|value| strict_equals(value, &condition.depends_on_value));
        if !matched {
            return false;
        }
    }
    if let Some(rule) = &condition.when
        && !rule.evaluate(scope)
    {
        return false;
    }
    match &condition.predicate {
        Some(predicate) => call_guarded(name, predicate, scope),
        None => true,
    }
}

thread_local! {
    static IN_PREDICATE: Cell<bool> = const { Cell::new(false) };
}

/// Stop the process panic hook from reporting panics raised by visibility predicates.
///
/// A predicate panic is caught and turns into a hidden field, but the global hook
/// still runs first, so the default hook prints the panic to stderr. This wraps the
/// current hook and skips it while a predicate is running on the same thread.
/// Other panics reach the wrapped hook as before. Call it after any other hook is
/// installed; later calls do nothing.
pub fn silence_predicate_panics() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !evaluating_predicate() {
                previous(info);
            }
        }));
    });
}

pub(crate) fn evaluating_predicate() -> bool {
    IN_PREDICATE.try_with(Cell::get).unwrap_or(false)
}

struct PredicateScope {
    previous: bool,
}

impl PredicateScope {
    fn enter() -> Self {
        Self {
            previous: IN_PREDICATE.replace(true),
        }
    }
}

impl Drop for PredicateScope {
    fn drop(&mut self) {
        IN_PREDICATE.set(self.previous);
    }
}

fn call_guarded(name: &str, predicate: &Predicate, scope: &Value) -> bool {
    let label = predicate.label().unwrap_or(name);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _scope = PredicateScope::enter();
        predicate.call(scope)
    }));
    match outcome {
        Ok(Ok(visible)) => visible,
        Ok(Err(err)) => {
            warn!(field = label, error = %err, "visibility predicate failed, hiding field");
            false
        }
        Err(payload) => {
            warn!(
                field = label,
                panic = panic_message(payload.as_ref()),
                "visibility predicate panicked, hiding field"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, Predicate, Rule};
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gated(condition: Condition) -> FieldDeclaration {
        FieldDeclaration::conditional("phone", condition, FieldDeclaration::input("phone"))
    }

    #[test]
    fn leaves_are_always_visible() {
        assert!(is_visible(&FieldDeclaration::input("email"), &json!({})));
        assert!(is_visible(&FieldDeclaration::input("email"), &Value::Null));
    }

    #[test]
    fn depends_on_uses_strict_equality() {
        let field = gated(Condition::depends_on("hasPhone", true).unwrap());
        assert!(is_visible(&field, &json!({"hasPhone": true})));
        assert!(!is_visible(&field, &json!({"hasPhone": "true"})));
        assert!(!is_visible(&field, &json!({"hasPhone": 1})));
        assert!(!is_visible(&field, &json!({})));
    }

    #[test]
    fn predicate_receives_partial_values() {
        let field = gated(Condition::when(|values| {
            values.get("slotType").and_then(Value::as_str) == Some("STATIC")
        }));
        assert!(is_visible(&field, &json!({"slotType": "STATIC"})));
        assert!(!is_visible(&field, &json!({})));
    }

    #[test]
    fn failing_predicate_hides_field() {
        let field = gated(Condition::predicate(Predicate::fallible(|_| {
            Err(anyhow!("lookup exploded"))
        })));
        assert!(!is_visible(&field, &json!({})));
    }

    #[test]
    fn panicking_predicate_hides_field() {
        let field = gated(Condition::when(|values| {
            values["missing"].as_str().expect("missing is a string") == "x"
        }));
        assert!(!is_visible(&field, &json!({})));
    }

    #[test]
    fn predicate_scope_is_marked_while_running() {
        let field = gated(Condition::when(|_| evaluating_predicate()));
        assert!(!evaluating_predicate());
        assert!(is_visible(&field, &json!({})));
        assert!(!evaluating_predicate());
    }

    #[test]
    fn silenced_panics_still_hide_the_field() {
        silence_predicate_panics();
        silence_predicate_panics();
        let field = gated(Condition::when(|_| panic!("boom")));
        assert!(!is_visible(&field, &json!({})));
        assert!(!evaluating_predicate());
    }

    #[test]
    fn all_present_gates_must_hold() {
        let mut condition = Condition::depends_on("kind", "sql").unwrap();
        condition.when = Some(Rule::truthy("enabled").unwrap());
        let field = gated(condition);
        assert!(is_visible(&field, &json!({"kind": "sql", "enabled": true})));
        assert!(!is_visible(&field, &json!({"kind": "sql", "enabled": false})));
        assert!(!is_visible(&field, &json!({"kind": "nosql", "enabled": true})));
    }

    #[test]
    fn predicates_are_not_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let field = gated(Condition::when(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }));
        let values = json!({});
        assert!(is_visible(&field, &values));
        assert!(is_visible(&field, &values));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
