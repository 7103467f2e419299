use chrono::{DateTime, NaiveDate, SecondsFormat};
use serde_json::Value;

use crate::upstream::json_id;

/// Target column type. Values are bound as text and cast in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Boolean,
    Date,
    Timestamp,
    Json,
}

impl ColumnKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "bigint",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Date => "date",
            ColumnKind::Timestamp => "timestamptz",
            ColumnKind::Json => "jsonb",
        }
    }

    /// Text form of `value` that casts cleanly to `sql_type`, or None for NULL.
    /// Values that don't fit the column become NULL; the raw item stays in `payload`.
    pub fn normalize(&self, value: &Value) -> Option<String> {
        if value.is_null() {
            return None;
        }
        match self {
            ColumnKind::Text => match value {
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            },
            ColumnKind::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(|i| i.to_string()),
                Value::String(s) => s.trim().parse::<i64>().ok().map(|i| i.to_string()),
                _ => None,
            },
            ColumnKind::Boolean => match value {
                Value::Bool(b) => Some(b.to_string()),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "yes" | "1" => Some("true".into()),
                    "false" | "f" | "no" | "0" => Some("false".into()),
                    _ => None,
                },
                Value::Number(n) => n.as_i64().map(|i| (i != 0).to_string()),
                _ => None,
            },
            ColumnKind::Date => value.as_str().and_then(|s| {
                let day = s.get(..10)?;
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .ok()
                    .map(|d| d.format("%Y-%m-%d").to_string())
            }),
            ColumnKind::Timestamp => value.as_str().and_then(|s| {
                DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
            }),
            ColumnKind::Json => Some(value.to_string()),
        }
    }
}

/// (column, JSON pointer into the upstream item, kind)
pub type ColumnSpec = (&'static str, &'static str, ColumnKind);

/// How one upstream entity lands in its mirror table
#[derive(Debug, Clone, Copy)]
pub struct EntityMapping {
    pub table: &'static str,
    pub external_id: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl EntityMapping {
    pub fn external_id_of(&self, item: &Value) -> Option<String> {
        item.pointer(self.external_id).and_then(json_id)
    }

    /// Normalized column values in `columns` order
    pub fn values_of(&self, item: &Value) -> Vec<Option<String>> {
        self.columns
            .iter()
            .map(|(_, pointer, kind)| item.pointer(pointer).and_then(|v| kind.normalize(v)))
            .collect()
    }
}

use ColumnKind::*;

pub const LMS_YEAR_GROUPS: EntityMapping = EntityMapping {
    table: "lms_year_groups",
    external_id: "/id",
    columns: &[("name", "/name", Text), ("grade", "/grade", Text), ("program", "/program", Text)],
};

pub const LMS_CLASSES: EntityMapping = EntityMapping {
    table: "lms_classes",
    external_id: "/id",
    columns: &[
        ("name", "/name", Text),
        ("subject_name", "/subject_name", Text),
        ("grade", "/grade", Text),
        ("program_code", "/program_code", Text),
        ("archived", "/archived", Boolean),
    ],
};

pub const LMS_TEACHERS: EntityMapping = EntityMapping {
    table: "lms_teachers",
    external_id: "/id",
    columns: &[
        ("first_name", "/first_name", Text),
        ("last_name", "/last_name", Text),
        ("email", "/email", Text),
        ("archived", "/archived", Boolean),
    ],
};

pub const LMS_STUDENTS: EntityMapping = EntityMapping {
    table: "lms_students",
    external_id: "/id",
    columns: &[
        ("student_code", "/student_id", Text),
        ("first_name", "/first_name", Text),
        ("last_name", "/last_name", Text),
        ("email", "/email", Text),
        ("grade", "/class_grade", Text),
        ("year_group_id", "/year_group_id", Text),
        ("archived", "/archived", Boolean),
        ("updated_upstream_at", "/updated_at", Timestamp),
    ],
};

pub const LMS_CLASS_MEMBERSHIPS: EntityMapping = EntityMapping {
    table: "lms_class_memberships",
    external_id: "/id",
    columns: &[
        ("class_external_id", "/class_id", Text),
        ("student_external_id", "/student_id", Text),
    ],
};

pub const SIS_STUDENTS: EntityMapping = EntityMapping {
    table: "sis_students",
    external_id: "/id",
    columns: &[
        ("student_number", "/student_number", Text),
        ("first_name", "/first_name", Text),
        ("last_name", "/last_name", Text),
        ("grade_level", "/grade_level", Integer),
        ("enrollment_status", "/enrollment_status", Text),
        ("date_of_birth", "/date_of_birth", Date),
        ("updated_upstream_at", "/updated_at", Timestamp),
    ],
};

pub const SIS_STAFF: EntityMapping = EntityMapping {
    table: "sis_staff",
    external_id: "/id",
    columns: &[
        ("first_name", "/first_name", Text),
        ("last_name", "/last_name", Text),
        ("email", "/email", Text),
        ("title", "/title", Text),
    ],
};

pub const SIS_ATTENDANCE: EntityMapping = EntityMapping {
    table: "sis_attendance",
    external_id: "/id",
    columns: &[
        ("student_external_id", "/student_id", Text),
        ("attendance_date", "/date", Date),
        ("status", "/status", Text),
        ("period", "/period", Text),
        ("minutes_absent", "/minutes_absent", Integer),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_by_kind() {
        assert_eq!(Integer.normalize(&json!(9)), Some("9".into()));
        assert_eq!(Integer.normalize(&json!("10")), Some("10".into()));
        assert_eq!(Integer.normalize(&json!(9.0)), Some("9".into()));
        assert_eq!(Integer.normalize(&json!(9.5)), None);
        assert_eq!(Integer.normalize(&json!("ten")), None);

        assert_eq!(Boolean.normalize(&json!("Yes")), Some("true".into()));
        assert_eq!(Boolean.normalize(&json!(0)), Some("false".into()));

        assert_eq!(Date.normalize(&json!("2024-09-02T08:00:00Z")), Some("2024-09-02".into()));
        assert_eq!(Date.normalize(&json!("02/09/2024")), None);

        assert_eq!(
            Timestamp.normalize(&json!("2024-09-02T10:00:00+02:00")),
            Some("2024-09-02T08:00:00Z".into())
        );
        assert_eq!(Timestamp.normalize(&json!("yesterday")), None);

        assert_eq!(Text.normalize(&json!(12)), Some("12".into()));
        assert_eq!(Text.normalize(&json!(null)), None);
    }

    #[test]
    fn extracts_ids_and_values_in_column_order() {
        let item = json!({
            "id": 501,
            "student_number": "S-1",
            "first_name": "Ada",
            "grade_level": "7",
            "date_of_birth": "2012-03-04",
        });
        assert_eq!(SIS_STUDENTS.external_id_of(&item), Some("501".into()));
        let values = SIS_STUDENTS.values_of(&item);
        assert_eq!(values.len(), SIS_STUDENTS.columns.len());
        assert_eq!(values[0].as_deref(), Some("S-1"));
        assert_eq!(values[2], None);
        assert_eq!(values[3].as_deref(), Some("7"));
        assert_eq!(values[5].as_deref(), Some("2012-03-04"));
    }

    #[test]
    fn missing_external_id_is_none() {
        assert_eq!(LMS_CLASSES.external_id_of(&json!({"name": "Maths"})), None);
    }
}
