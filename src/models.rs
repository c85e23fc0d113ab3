use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::model::upstream::opt_string_or_number;

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[serde(default)]
    #[schema(example = "2023cs1234")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AttendanceReq {
    #[serde(default)]
    pub token: Option<String>,
}

/// Body of `POST /subject-attendance`. Ids may arrive as numbers.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttendanceReq {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    #[schema(value_type = Option<String>)]
    pub student_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    #[schema(value_type = Option<String>)]
    pub cf_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SubjectAttendanceQuery {
    pub subject: Option<String>,
    pub student_id: Option<String>,
    pub cf_id: Option<String>,
}

/// Fields that identify one subject's attendance, validated.
#[derive(Debug, Clone)]
pub struct SubjectSelector {
    pub subject: String,
    pub student_id: String,
    pub cf_id: String,
}

impl SubjectSelector {
    /// `None` unless all three fields are present and non-blank.
    pub fn from_parts(
        subject: Option<String>,
        student_id: Option<String>,
        cf_id: Option<String>,
    ) -> Option<Self> {
        let keep = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Some(Self {
            subject: keep(subject)?,
            student_id: keep(student_id)?,
            cf_id: keep(cf_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_are_accepted_in_body() {
        let req: SubjectAttendanceReq = serde_json::from_str(
            r#"{"subject":"OS","studentId":98765,"cfId":"11","token":"t"}"#,
        )
        .unwrap();
        assert_eq!(req.student_id.as_deref(), Some("98765"));
        assert_eq!(req.cf_id.as_deref(), Some("11"));
    }

    #[test]
    fn selector_requires_every_field() {
        assert!(SubjectSelector::from_parts(Some("OS".into()), Some("1".into()), None).is_none());
        assert!(
            SubjectSelector::from_parts(Some("  ".into()), Some("1".into()), Some("2".into()))
                .is_none()
        );
        let sel =
            SubjectSelector::from_parts(Some(" OS ".into()), Some("1".into()), Some("2".into()))
                .unwrap();
        assert_eq!(sel.subject, "OS");
    }
}
