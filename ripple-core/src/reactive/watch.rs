//! User Watchers
//!
//! [`watch`] and [`watch_path`] create `user` subscribers on behalf of
//! application code. Errors raised by their getters and callbacks are routed
//! to the configured error handler instead of propagating.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::context::untracked;
use super::subscriber::Subscriber;
use crate::error::{report_error, warn, ReactiveError};
use crate::observer::Value;

/// Options for [`watch`] and [`watch_path`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Also fire on mutations nested anywhere inside the watched value.
    pub deep: bool,
    /// Invoke the callback once right away with `(value, Null)`.
    pub immediate: bool,
    /// Fire inline with each mutation instead of once per flush.
    pub sync: bool,
}

/// Watch the value produced by `getter`.
///
/// `callback` receives `(new, old)`. Tear the returned subscriber down to
/// stop watching.
pub fn watch<G, C>(getter: G, callback: C, options: WatchOptions) -> Result<Subscriber, ReactiveError>
where
    G: Fn() -> Result<Value, ReactiveError> + 'static,
    C: Fn(&Value, &Value) -> Result<(), ReactiveError> + 'static,
{
    let expression = std::any::type_name::<G>().to_owned();
    create(getter, expression, callback, options)
}

/// Watch a dot-delimited path such as `"user.address.city"` under `target`.
///
/// Numeric segments index into lists. A path with characters other than
/// letters, digits, `_`, `$` and `.` is rejected with a warning and the
/// watcher evaluates to `Null`.
pub fn watch_path<C>(target: &Value, path: &str, callback: C, options: WatchOptions) -> Result<Subscriber, ReactiveError>
where
    C: Fn(&Value, &Value) -> Result<(), ReactiveError> + 'static,
{
    match parse_path(path) {
        Some(segments) => {
            let target = target.clone();
            create(move || Ok(resolve(&target, &segments)), path.to_owned(), callback, options)
        }
        None => {
            warn(&format!(
                "Failed watching path: \"{path}\" Watcher only accepts simple dot-delimited paths. \
                 For full control, use a function instead."
            ));
            create(|| Ok(Value::Null), path.to_owned(), callback, options)
        }
    }
}

fn create<G, C>(getter: G, expression: String, callback: C, options: WatchOptions) -> Result<Subscriber, ReactiveError>
where
    G: Fn() -> Result<Value, ReactiveError> + 'static,
    C: Fn(&Value, &Value) -> Result<(), ReactiveError> + 'static,
{
    let callback = Rc::new(callback);
    let stored = callback.clone();

    let mut builder = Subscriber::builder(getter)
        .expression(expression)
        .user()
        .callback(move |new, old| stored(new, old));
    if options.deep {
        builder = builder.deep();
    }
    if options.sync {
        builder = builder.sync();
    }
    let subscriber = builder.build()?;

    if options.immediate {
        let value = subscriber.value();
        if let Err(err) = untracked(|| callback(&value, &Value::Null)) {
            report_error(
                &err,
                &format!("callback for immediate watcher \"{}\"", subscriber.expression()),
            );
        }
    }
    Ok(subscriber)
}

fn parse_path(path: &str) -> Option<Vec<String>> {
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
    valid.then(|| path.split('.').map(str::to_owned).collect())
}

fn resolve(target: &Value, segments: &[String]) -> Value {
    let mut current = target.clone();
    for segment in segments {
        let next = match &current {
            Value::Record(record) => record.get(segment),
            Value::List(list) => segment.parse().ok().and_then(|index| list.get(index)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::observer::observe_root;
    use crate::scheduler::run_pending;
    use serde_json::json;
    use std::cell::RefCell;

    type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Calls, impl Fn(&Value, &Value) -> Result<(), ReactiveError>) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let c = calls.clone();
        (calls, move |new: &Value, old: &Value| {
            c.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        })
    }

    fn root(value: serde_json::Value) -> Value {
        let value = Value::from(value);
        observe_root(&value);
        value
    }

    #[test]
    fn path_watch_follows_nested_records_and_lists() {
        let state = root(json!({"user": {"tags": ["a", "b"]}}));
        let (calls, callback) = recorder();
        let sub = watch_path(&state, "user.tags.1", callback, WatchOptions::default()).unwrap();
        assert_eq!(sub.value().as_str(), Some("b"));

        let tags = state.as_record().unwrap().get("user").unwrap();
        let tags = tags.as_record().unwrap().get("tags").unwrap();
        tags.as_list().unwrap().splice(1, 1, [Value::from("c")]).unwrap();
        run_pending();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_str(), Some("c"));
        assert_eq!(calls[0].1.as_str(), Some("b"));
    }

    #[test]
    fn missing_path_segments_resolve_to_null() {
        let state = root(json!({"a": 1}));
        let (_, callback) = recorder();
        let sub = watch_path(&state, "a.b.c", callback, WatchOptions::default()).unwrap();
        assert!(sub.value().is_null());
    }

    #[test]
    fn invalid_path_warns_and_watches_nothing() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let w = warnings.clone();
        config::configure(|c| c.warn_handler = Some(Rc::new(move |m: &str| w.borrow_mut().push(m.to_owned()))));

        let state = root(json!({"a": 1}));
        let (_, callback) = recorder();
        let sub = watch_path(&state, "a[0]", callback, WatchOptions::default()).unwrap();

        assert!(sub.value().is_null());
        assert_eq!(sub.dependency_count(), 0);
        assert!(warnings.borrow()[0].starts_with("Failed watching path: \"a[0]\""));
    }

    #[test]
    fn immediate_fires_with_null_old_value() {
        let state = root(json!({"a": 7}));
        let (calls, callback) = recorder();
        let options = WatchOptions {
            immediate: true,
            ..WatchOptions::default()
        };
        let _sub = watch_path(&state, "a", callback, options).unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_number(), Some(7.0));
        assert!(calls[0].1.is_null());
    }

    #[test]
    fn immediate_callback_errors_are_reported() {
        let infos = Rc::new(RefCell::new(Vec::new()));
        let i = infos.clone();
        config::configure(|c| c.error_handler = Some(Rc::new(move |_: &ReactiveError, info: &str| i.borrow_mut().push(info.to_owned()))));

        let state = root(json!({"a": 1}));
        let options = WatchOptions {
            immediate: true,
            ..WatchOptions::default()
        };
        let _sub = watch_path(&state, "a", |_, _| Err(ReactiveError::msg("nope")), options).unwrap();
        assert_eq!(*infos.borrow(), vec!["callback for immediate watcher \"a\"".to_string()]);
    }

    #[test]
    fn deep_watch_sees_nested_mutation() {
        let state = root(json!({"todo": {"done": false}}));
        let record = state.as_record().cloned().unwrap();
        let (calls, callback) = recorder();
        let options = WatchOptions {
            deep: true,
            ..WatchOptions::default()
        };
        let r = record.clone();
        let _sub = watch(move || Ok(r.get("todo").unwrap_or_default()), callback, options).unwrap();

        let todo = record.get("todo").unwrap();
        todo.as_record().unwrap().set("done", Value::from(true)).unwrap();
        run_pending();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        // Same container on both sides
        assert!(calls[0].0.strict_eq(&calls[0].1));
    }

    #[test]
    fn shallow_watch_ignores_nested_mutation() {
        let state = root(json!({"todo": {"done": false}}));
        let record = state.as_record().cloned().unwrap();
        let (calls, callback) = recorder();
        let r = record.clone();
        let _sub = watch(move || Ok(r.get("todo").unwrap_or_default()), callback, WatchOptions::default()).unwrap();

        let todo = record.get("todo").unwrap();
        todo.as_record().unwrap().set("done", Value::from(true)).unwrap();
        run_pending();
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn path_parsing() {
        assert_eq!(parse_path("a.b"), Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(parse_path("$el._x"), Some(vec!["$el".to_string(), "_x".to_string()]));
        assert_eq!(parse_path("a-b"), None);
        assert_eq!(parse_path("a b"), None);
    }
}
