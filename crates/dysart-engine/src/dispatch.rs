//! Exposed-method dispatch.
//!
//! A remote call names a feature, a method and positional/keyword
//! arguments. Only methods in the kind's explicit method list are callable;
//! refresh-bearing methods refresh the feature before running.

use serde::Serialize;
use serde_json::{Map, Value};

use dysart_core::{FeatureId, RequestId};

use crate::error::EngineError;
use crate::kind::MethodSource;
use crate::lab::Laboratory;

impl Laboratory {
    /// Invokes exposed method `method` of the feature named `feature`.
    pub async fn invoke(
        &mut self,
        feature: &str,
        method: &str,
        args: &[Value],
        kwargs: &Map<String, Value>,
        trigger: Option<&RequestId>,
    ) -> Result<Value, EngineError> {
        let id = self.resolve(feature)?;
        let spec = self
            .registered_kind(&id)?
            .method(method)
            .copied()
            .ok_or_else(|| EngineError::Forbidden {
                feature: id.clone(),
                method: method.to_string(),
            })?;
        tracing::debug!(feature = %id, method, "invoke");

        if spec.refresh {
            self.refresh(&id, trigger).await?;
        }
        let args = Args {
            method,
            args,
            kwargs,
        };
        match spec.source {
            MethodSource::Accessor => self.read_accessor(&id, method, args.index(0)?),
            MethodSource::Builtin => self.call_builtin(&id, method, &args),
        }
    }

    fn call_builtin(&mut self, id: &FeatureId, method: &str, args: &Args<'_>) -> Result<Value, EngineError> {
        match method {
            "tree" => Ok(Value::String(self.tree(id)?)),
            "set_expired" => {
                let expired = args.bool_or(0, "expired", true)?;
                self.set_override(id, expired)?;
                Ok(Value::Null)
            }
            "call_records" => to_json(self.call_records(id)?),
            "is_expired" => Ok(Value::Bool(!self.stale_set(id)?.is_empty())),
            "parents" => to_json(self.parents(id)?),
            "diffs" => to_json(self.diffs(id)?),
            "set_value" => {
                let label = args.string(0, "label")?;
                let value = args.required(1, "value")?.clone();
                self.set_value(id, label, value)?;
                Ok(Value::Null)
            }
            "all_results" => to_json(self.read_all_results(id, args.index(0)?)?),
            "results_history" => {
                let name = args.string(0, "name")?;
                to_json(self.read_history(id, name)?)
            }
            other => Err(EngineError::Forbidden {
                feature: id.clone(),
                method: other.to_string(),
            }),
        }
    }
}

fn to_json(value: impl Serialize) -> Result<Value, EngineError> {
    Ok(serde_json::to_value(value)?)
}

/// Positional-or-keyword argument lookup for one call.
struct Args<'a> {
    method: &'a str,
    args: &'a [Value],
    kwargs: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    fn get(&self, position: usize, name: &str) -> Option<&'a Value> {
        self.kwargs.get(name).or_else(|| self.args.get(position))
    }

    fn bad(&self, reason: impl Into<String>) -> EngineError {
        EngineError::BadArgument {
            method: self.method.to_string(),
            reason: reason.into(),
        }
    }

    fn required(&self, position: usize, name: &str) -> Result<&'a Value, EngineError> {
        self.get(position, name)
            .ok_or_else(|| self.bad(format!("missing argument '{name}'")))
    }

    fn string(&self, position: usize, name: &str) -> Result<&'a str, EngineError> {
        self.required(position, name)?
            .as_str()
            .ok_or_else(|| self.bad(format!("'{name}' must be a string")))
    }

    fn bool_or(&self, position: usize, name: &str, default: bool) -> Result<bool, EngineError> {
        match self.get(position, name) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| self.bad(format!("'{name}' must be a boolean"))),
        }
    }

    /// Snapshot index, `-1` when absent.
    fn index(&self, position: usize) -> Result<isize, EngineError> {
        match self.get(position, "index") {
            None | Some(Value::Null) => Ok(-1),
            Some(v) => v
                .as_i64()
                .and_then(|i| isize::try_from(i).ok())
                .ok_or_else(|| self.bad("'index' must be an integer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add, lab};
    use serde_json::json;

    fn no_kwargs() -> Map<String, Value> {
        Map::new()
    }

    #[tokio::test]
    async fn accessor_method_refreshes_then_reads() {
        let (mut lab, probe) = lab();
        add(&mut lab, "spec", &[]);
        let value = lab
            .invoke("spec", "doubled", &[], &no_kwargs(), None)
            .await
            .unwrap();
        assert_eq!(value, json!(2.0));
        assert_eq!(probe.updates(), 1);
    }

    #[tokio::test]
    async fn unexposed_method_is_forbidden() {
        let (mut lab, probe) = lab();
        add(&mut lab, "spec", &[]);
        let err = lab
            .invoke("spec", "update", &[], &no_kwargs(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden { ref method, .. } if method == "update"));
        assert_eq!(probe.updates(), 0);
    }

    #[tokio::test]
    async fn unknown_feature_is_not_found() {
        let (mut lab, _probe) = lab();
        let err = lab
            .invoke("ghost", "tree", &[], &no_kwargs(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::FeatureNotFound(ref name) if name == "ghost"));
    }

    #[tokio::test]
    async fn non_refreshing_builtins_do_not_measure() {
        let (mut lab, probe) = lab();
        add(&mut lab, "spec", &[]);
        add(&mut lab, "rabi", &[("spec", "spec")]);

        let expired = lab
            .invoke("rabi", "is_expired", &[], &no_kwargs(), None)
            .await
            .unwrap();
        assert_eq!(expired, json!(true));
        let parents = lab
            .invoke("rabi", "parents", &[], &no_kwargs(), None)
            .await
            .unwrap();
        assert_eq!(parents, json!({"spec": "spec"}));
        let tree = lab
            .invoke("rabi", "tree", &[], &no_kwargs(), None)
            .await
            .unwrap();
        assert!(tree.as_str().unwrap().contains("spec: spec"));
        assert_eq!(probe.updates(), 0);
    }

    #[tokio::test]
    async fn set_value_records_setting_and_expires() {
        let (mut lab, probe) = lab();
        let spec = add(&mut lab, "spec", &[]);
        lab.refresh(&spec, None).await.unwrap();

        let mut kwargs = Map::new();
        kwargs.insert("value".into(), json!(-20.0));
        lab.invoke("spec", "set_value", &[json!("drive_power")], &kwargs, None)
            .await
            .unwrap();
        assert!(lab.feature(&spec).unwrap().is_overridden());
        let diffs = lab
            .invoke("spec", "diffs", &[], &no_kwargs(), None)
            .await
            .unwrap();
        assert_eq!(diffs, json!({"drive_power": -20.0}));

        lab.invoke("spec", "set_expired", &[json!(false)], &no_kwargs(), None)
            .await
            .unwrap();
        assert!(!lab.feature(&spec).unwrap().is_overridden());
        assert_eq!(probe.updates(), 1);
    }

    #[tokio::test]
    async fn bad_arguments_are_rejected() {
        let (mut lab, _probe) = lab();
        add(&mut lab, "spec", &[]);
        let err = lab
            .invoke("spec", "set_value", &[json!(3)], &no_kwargs(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadArgument { .. }));
        let err = lab
            .invoke("spec", "doubled", &[json!("last")], &no_kwargs(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadArgument { .. }));
    }

    #[tokio::test]
    async fn call_records_and_history_serialize() {
        let (mut lab, _probe) = lab();
        add(&mut lab, "spec", &[]);
        let history = lab
            .invoke("spec", "results_history", &[json!("doubled")], &no_kwargs(), None)
            .await
            .unwrap();
        assert_eq!(history, json!([2.0]));
        let records = lab
            .invoke("spec", "call_records", &[], &no_kwargs(), None)
            .await
            .unwrap();
        assert_eq!(records[0]["status"], json!("DONE"));
    }
}
