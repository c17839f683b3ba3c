//! Role-gated navigation for the portal.

use std::fmt;

use super::session::Session;
use crate::model::Role;

const ADMIN_PAGES: &[&str] = &[
    "dashboard",
    "users",
    "exams",
    "salles",
    "modules",
    "groups",
    "claims",
    "notifications",
    "import",
];
const TEACHER_PAGES: &[&str] = &["dashboard", "exams", "claims", "notifications"];
const STUDENT_PAGES: &[&str] = &["dashboard", "exams"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    ForgotPassword,
    ResetPassword,
    Page { area: Role, page: &'static str },
}

fn area_segment(role: Role) -> &'static str {
    match role {
        Role::Admin => "admin",
        Role::Teacher => "teacher",
        Role::Student => "student",
    }
}

fn pages(role: Role) -> &'static [&'static str] {
    match role {
        Role::Admin => ADMIN_PAGES,
        Role::Teacher => TEACHER_PAGES,
        Role::Student => STUDENT_PAGES,
    }
}

pub fn dashboard_for(role: Role) -> Route {
    Route::Page {
        area: role,
        page: "dashboard",
    }
}

impl Route {
    pub fn parse(path: &str) -> Option<Route> {
        let path = path.split(|c| c == '?' || c == '#').next().unwrap_or("");
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] | ["login"] => Some(Route::Login),
            ["forgot-password"] => Some(Route::ForgotPassword),
            ["reset-password"] => Some(Route::ResetPassword),
            [area, rest @ ..] => {
                let role = match *area {
                    "admin" => Role::Admin,
                    "teacher" => Role::Teacher,
                    "student" => Role::Student,
                    _ => return None,
                };
                let wanted = rest.first().copied().unwrap_or("dashboard");
                if rest.len() > 1 {
                    return None;
                }
                let page = pages(role).iter().copied().find(|p| *p == wanted)?;
                Some(Route::Page { area: role, page })
            }
        }
    }

    pub fn is_public(&self) -> bool {
        !matches!(self, Route::Page { .. })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Login => f.write_str("/login"),
            Route::ForgotPassword => f.write_str("/forgot-password"),
            Route::ResetPassword => f.write_str("/reset-password"),
            Route::Page { area, page } => write!(f, "/{}/{}", area_segment(*area), page),
        }
    }
}

/// Where a navigation to `path` lands given the current session.
pub fn resolve(path: &str, session: Option<&Session>) -> Route {
    let requested = Route::parse(path);
    let Some(session) = session else {
        return match requested {
            Some(r) if r.is_public() => r,
            _ => Route::Login,
        };
    };
    let role = session.user.role;
    match requested {
        Some(Route::Page { area, page }) if area == role => Route::Page { area, page },
        Some(r @ (Route::ForgotPassword | Route::ResetPassword)) => r,
        _ => dashboard_for(role),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;

    fn session(role: Role) -> Session {
        Session {
            token: "t".into(),
            user: User {
                id: "u".into(),
                matricule: "M1".into(),
                name: "N".into(),
                email: "n@example.edu".into(),
                role,
                password_hash: String::new(),
                specialite: None,
                niveau: None,
                annee_scolaire: None,
                group_id: None,
                created_at: String::new(),
                updated_at: String::new(),
            },
        }
    }

    #[test]
    fn anonymous_users_go_to_login() {
        assert_eq!(resolve("/admin/users", None), Route::Login);
        assert_eq!(resolve("/student", None), Route::Login);
        assert_eq!(resolve("/forgot-password", None), Route::ForgotPassword);
        assert_eq!(resolve("/reset-password?token=x", None), Route::ResetPassword);
    }

    #[test]
    fn other_roles_trees_redirect_to_own_dashboard() {
        let teacher = session(Role::Teacher);
        assert_eq!(resolve("/admin/users", Some(&teacher)).to_string(), "/teacher/dashboard");
        assert_eq!(resolve("/student/exams", Some(&teacher)).to_string(), "/teacher/dashboard");
        assert_eq!(resolve("/login", Some(&teacher)).to_string(), "/teacher/dashboard");
    }

    #[test]
    fn own_pages_resolve_as_requested() {
        let admin = session(Role::Admin);
        assert_eq!(resolve("/admin/salles", Some(&admin)).to_string(), "/admin/salles");
        assert_eq!(resolve("/admin", Some(&admin)).to_string(), "/admin/dashboard");
        assert_eq!(resolve("/admin/nope", Some(&admin)).to_string(), "/admin/dashboard");
        let student = session(Role::Student);
        assert_eq!(resolve("/student/exams", Some(&student)).to_string(), "/student/exams");
        assert_eq!(resolve("/student/claims", Some(&student)).to_string(), "/student/dashboard");
    }
}
