use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Every permission code the dashboards know about, `resource.action`.
///
/// Requests for codes outside this list are allowed but can never be granted.
pub const CATALOG: &[&str] = &[
    "dashboard.view",
    "class.view",
    "class.create",
    "class.edit",
    "class.delete",
    "course.view",
    "course.create",
    "course.edit",
    "course.delete",
    "grade.view",
    "grade.create",
    "grade.edit",
    "grade.delete",
    "attendance.view",
    "attendance.record",
    "attendance.edit",
    "certificate.view",
    "certificate.create",
    "certificate.issue",
    "certificate.delete",
    "payment.view",
    "payment.create",
    "payment.edit",
    "program.view",
    "program.create",
    "program.edit",
    "program.delete",
    "student.view",
    "student.create",
    "student.edit",
    "student.delete",
    "teacher.view",
    "teacher.create",
    "teacher.edit",
    "teacher.delete",
    "user.view",
    "user.create",
    "user.edit",
    "user.delete",
    "role.view",
    "role.edit",
];

const TEACHER_DEFAULTS: &[&str] = &[
    "dashboard.view",
    "class.view",
    "course.view",
    "grade.view",
    "grade.create",
    "grade.edit",
    "attendance.view",
    "attendance.record",
    "attendance.edit",
    "certificate.view",
    "program.view",
    "student.view",
];

const STUDENT_DEFAULTS: &[&str] = &[
    "dashboard.view",
    "class.view",
    "course.view",
    "grade.view",
    "attendance.view",
    "certificate.view",
    "payment.view",
    "program.view",
];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionCode(String);

impl PermissionCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        CATALOG.contains(&self.0.as_str())
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermissionCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Teacher, Role::Student];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    /// Built-in grants used to seed a fresh directory.
    pub fn default_codes(self) -> Vec<PermissionCode> {
        let codes: &[&str] = match self {
            Role::Admin => CATALOG,
            Role::Teacher => TEACHER_DEFAULTS,
            Role::Student => STUDENT_DEFAULTS,
        };
        codes.iter().copied().map(PermissionCode::from).collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codes granted to one user at the moment of a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPermissionSet {
    user_id: String,
    codes: BTreeSet<PermissionCode>,
}

impl UserPermissionSet {
    pub fn new<I>(user_id: impl Into<String>, codes: I) -> Self
    where
        I: IntoIterator<Item = PermissionCode>,
    {
        Self {
            user_id: user_id.into(),
            codes: codes.into_iter().collect(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn contains(&self, code: &PermissionCode) -> bool {
        self.codes.contains(code)
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.codes.iter().map(|c| c.as_str().to_string()).collect()
    }
}

/// Exact membership. No prefix, hierarchy or wildcard matching.
pub fn has_permission(code: &PermissionCode, granted: &UserPermissionSet) -> bool {
    granted.contains(code)
}
