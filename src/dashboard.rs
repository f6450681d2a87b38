use crate::permissions::{has_permission, PermissionCode, Role, UserPermissionSet};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub key: &'static str,
    pub title: &'static str,
    pub required: &'static str,
}

const fn section(key: &'static str, title: &'static str, required: &'static str) -> Section {
    Section {
        key,
        title,
        required,
    }
}

const ADMIN_SECTIONS: &[Section] = &[
    section("overview", "Overview", "dashboard.view"),
    section("classes", "Classes", "class.view"),
    section("courses", "Courses", "course.view"),
    section("programs", "Programs", "program.view"),
    section("students", "Students", "student.view"),
    section("teachers", "Teachers", "teacher.view"),
    section("grades", "Grades", "grade.view"),
    section("attendance", "Attendance", "attendance.view"),
    section("certificates", "Certificates", "certificate.view"),
    section("payments", "Payments", "payment.view"),
    section("users", "Users", "user.view"),
    section("roles", "Roles & Permissions", "role.view"),
];

const TEACHER_SECTIONS: &[Section] = &[
    section("overview", "Overview", "dashboard.view"),
    section("classes", "My Classes", "class.view"),
    section("courses", "Courses", "course.view"),
    section("students", "Students", "student.view"),
    section("grades", "Grades", "grade.view"),
    section("attendance", "Attendance", "attendance.view"),
    section("certificates", "Certificates", "certificate.view"),
];

const STUDENT_SECTIONS: &[Section] = &[
    section("overview", "Overview", "dashboard.view"),
    section("classes", "My Classes", "class.view"),
    section("courses", "Courses", "course.view"),
    section("programs", "Programs", "program.view"),
    section("grades", "Grades", "grade.view"),
    section("attendance", "Attendance", "attendance.view"),
    section("certificates", "Certificates", "certificate.view"),
    section("payments", "Payments", "payment.view"),
];

pub fn sections(role: Role) -> &'static [Section] {
    match role {
        Role::Admin => ADMIN_SECTIONS,
        Role::Teacher => TEACHER_SECTIONS,
        Role::Student => STUDENT_SECTIONS,
    }
}

pub fn landing_route(role: Role) -> String {
    format!("/dashboard/{}", role.as_str())
}

pub fn section_route(role: Role, section: &Section) -> String {
    if section.key == "overview" {
        landing_route(role)
    } else {
        format!("{}/{}", landing_route(role), section.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAccess {
    pub key: String,
    pub title: String,
    pub route: String,
    pub required: String,
    pub granted: bool,
}

/// Each section of `role`'s dashboard, flagged against one lookup result.
/// A failed lookup (`None`) grants nothing.
pub fn resolve(role: Role, granted: Option<&UserPermissionSet>) -> Vec<SectionAccess> {
    sections(role)
        .iter()
        .map(|s| SectionAccess {
            key: s.key.to_string(),
            title: s.title.to_string(),
            route: section_route(role, s),
            required: s.required.to_string(),
            granted: granted
                .map(|set| has_permission(&PermissionCode::from(s.required), set))
                .unwrap_or(false),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_section_is_gated_on_a_catalog_code() {
        for role in Role::ALL {
            for s in sections(role) {
                assert!(PermissionCode::from(s.required).is_known(), "{}", s.key);
            }
        }
    }

    #[test]
    fn default_grants_open_every_section_of_own_dashboard() {
        for role in Role::ALL {
            let set = UserPermissionSet::new("u", role.default_codes());
            let resolved = resolve(role, Some(&set));
            assert!(resolved.iter().all(|s| s.granted), "{role}");
        }
    }

    #[test]
    fn student_cannot_open_admin_user_management() {
        let set = UserPermissionSet::new("s", Role::Student.default_codes());
        let resolved = resolve(Role::Admin, Some(&set));
        let users = resolved.iter().find(|s| s.key == "users").expect("users section");
        assert!(!users.granted);
        assert_eq!(users.route, "/dashboard/admin/users");
    }

    #[test]
    fn failed_lookup_grants_nothing() {
        assert!(resolve(Role::Teacher, None).iter().all(|s| !s.granted));
    }
}
