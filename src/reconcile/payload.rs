use serde_json::{Map, Value};

use crate::{db::models::Feedback, error::ValidationError};

/// A validated inbound report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReport {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percentage
    pub humidity: f64,
    pub feedback: Feedback,
}

impl TelemetryReport {
    /// Validate a decoded JSON body. `None` means the body was not valid JSON.
    ///
    /// Older firmware sends `temp`/`hum` and `*_state`; both spellings are
    /// accepted, the long one wins when both are present.
    pub fn from_json(body: Option<&Value>) -> Result<Self, ValidationError> {
        let obj = body
            .and_then(Value::as_object)
            .ok_or(ValidationError::MalformedBody)?;

        Ok(Self {
            temperature: number(obj, "temperature", "temp")?,
            humidity: number(obj, "humidity", "hum")?,
            feedback: Feedback {
                heater: flag(obj, "heater_reported", "heater_state")?,
                mist: flag(obj, "mist_reported", "mist_state")?,
                light: flag(obj, "light_reported", "light_state")?,
            },
        })
    }
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str, alias: &str) -> Option<&'a Value> {
    let present = |key: &str| obj.get(key).filter(|v| !v.is_null());
    present(name).or_else(|| present(alias))
}

fn number(
    obj: &Map<String, Value>,
    name: &'static str,
    alias: &str,
) -> Result<f64, ValidationError> {
    let value = field(obj, name, alias).ok_or(ValidationError::MissingField(name))?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or(ValidationError::TypeMismatch {
            field: name,
            expected: "a finite number",
        })
}

fn flag(obj: &Map<String, Value>, name: &'static str, alias: &str) -> Result<bool, ValidationError> {
    match field(obj, name, alias) {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ValidationError::TypeMismatch {
            field: name,
            expected: "a boolean",
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(v: Value) -> Result<TelemetryReport, ValidationError> {
        TelemetryReport::from_json(Some(&v))
    }

    #[test]
    fn minimal_report_defaults_feedback_to_false() {
        let r = parse(json!({ "temperature": 20.0, "humidity": 50.0 })).unwrap();
        assert_eq!(r.temperature, 20.0);
        assert_eq!(r.humidity, 50.0);
        assert_eq!(r.feedback, Feedback::default());
    }

    #[test]
    fn full_report_with_feedback() {
        let r = parse(json!({
            "temperature": 24.8,
            "humidity": 61,
            "heater_reported": true,
            "mist_reported": false,
            "light_reported": true
        }))
        .unwrap();
        assert_eq!(r.humidity, 61.0);
        assert!(r.feedback.heater && !r.feedback.mist && r.feedback.light);
    }

    #[test]
    fn null_primary_field_falls_back_to_legacy_name() {
        let r = parse(json!({
            "temperature": null,
            "temp": 25.0,
            "humidity": 50.0,
            "heater_reported": null,
            "heater_state": true
        }))
        .unwrap();
        assert_eq!(r.temperature, 25.0);
        assert!(r.feedback.heater);
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let r = parse(json!({
            "temp": 25.0,
            "hum": 40.0,
            "heater_state": true,
            "mist_state": true
        }))
        .unwrap();
        assert_eq!(r.temperature, 25.0);
        assert_eq!(r.humidity, 40.0);
        assert!(r.feedback.heater && r.feedback.mist && !r.feedback.light);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let r = parse(json!({ "temperature": " 21.5", "humidity": "50" })).unwrap();
        assert_eq!(r.temperature, 21.5);
        assert_eq!(r.humidity, 50.0);
    }

    #[test]
    fn missing_humidity_is_reported() {
        assert_eq!(
            parse(json!({ "temperature": 25.0 })).unwrap_err(),
            ValidationError::MissingField("humidity")
        );
        assert_eq!(
            parse(json!({ "temperature": null, "humidity": 1 })).unwrap_err(),
            ValidationError::MissingField("temperature")
        );
    }

    #[test]
    fn non_numeric_temperature_is_a_type_mismatch() {
        let err = parse(json!({ "temperature": "sensor_error", "humidity": 50.0 })).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TypeMismatch { field: "temperature", .. }
        ));
    }

    #[test]
    fn non_finite_strings_are_rejected() {
        for bad in ["NaN", "inf", "-infinity"] {
            let err = parse(json!({ "temperature": bad, "humidity": 50.0 })).unwrap_err();
            assert!(matches!(err, ValidationError::TypeMismatch { .. }), "{bad}");
        }
    }

    #[test]
    fn non_boolean_feedback_is_a_type_mismatch() {
        let err = parse(json!({ "temperature": 1, "humidity": 1, "mist_reported": "yes" }))
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TypeMismatch { field: "mist_reported", .. }
        ));
    }

    #[test]
    fn non_object_body_is_malformed() {
        assert_eq!(
            TelemetryReport::from_json(None).unwrap_err(),
            ValidationError::MalformedBody
        );
        assert_eq!(parse(json!([1, 2])).unwrap_err(), ValidationError::MalformedBody);
    }
}
