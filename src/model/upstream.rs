//! Wire shapes of the college ERP API.
//!
//! Only the fields the dashboard reads are modelled. The ERP is loose about
//! types (ids and counters arrive as numbers or strings depending on the
//! endpoint), so the deserializers here accept both.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `{ "response": { "data": ... } }` wrapper used by every ERP endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub response: Option<EnvelopeData<T>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnvelopeData<T> {
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> Option<T> {
        self.response.and_then(|r| r.data)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseData {
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub course_code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceTally {
    #[serde(rename = "Present", default, deserialize_with = "lenient_u32")]
    pub present: u32,
    #[serde(rename = "Total", default, deserialize_with = "lenient_u32")]
    pub total: u32,
    #[serde(rename = "Percent", default, deserialize_with = "opt_string_or_number")]
    pub percent: Option<String>,
}

/// One row of `getCFMappedWithStudentID`: a subject mapping for the student,
/// optionally with its attendance tally embedded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectRecord {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub cdata: CourseData,
    #[serde(default)]
    pub attendance_summary: Option<AttendanceTally>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub batch: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub section: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub dept: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub student_id: Option<String>,
}

pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

pub(crate) fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().map(|v| v as u32).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subject_rows_accept_numeric_and_string_ids() {
        let body = json!({
            "response": {
                "data": [
                    {
                        "id": 4411,
                        "cdata": { "course_name": " Operating Systems ", "course_code": "CS501" },
                        "attendance_summary": { "Present": "18", "Total": 20, "Percent": 90.0 },
                        "student_id": 98765
                    },
                    { "id": "4412", "cdata": { "course_name": "Compilers" } }
                ]
            }
        });

        let env: Envelope<Vec<SubjectRecord>> = serde_json::from_value(body).unwrap();
        let rows = env.into_data().unwrap();
        assert_eq!(rows[0].id.as_deref(), Some("4411"));
        assert_eq!(rows[0].student_id.as_deref(), Some("98765"));
        let tally = rows[0].attendance_summary.as_ref().unwrap();
        assert_eq!(tally.present, 18);
        assert_eq!(tally.total, 20);
        assert_eq!(tally.percent.as_deref(), Some("90.0"));
        assert_eq!(rows[1].id.as_deref(), Some("4412"));
        assert!(rows[1].attendance_summary.is_none());
    }

    #[test]
    fn missing_response_yields_no_data() {
        let env: Envelope<Vec<SubjectRecord>> =
            serde_json::from_value(json!({ "message": "Invalid token" })).unwrap();
        assert_eq!(env.message.as_deref(), Some("Invalid token"));
        assert!(env.into_data().is_none());
    }
}
