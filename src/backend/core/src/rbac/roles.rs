//! Predefined roles with default permission sets.
//!
//! Scribe ships with five system roles and two templates:
//!
//! | Role                       | Kind     | Description                                   |
//! |----------------------------|----------|-----------------------------------------------|
//! | `admin`                    | system   | Every permission in the registry              |
//! | `editor`                   | system   | Manage any post or theme; read any profile    |
//! | `author`                   | system   | Write and publish own posts                   |
//! | `contributor`              | system   | Write own posts; cannot publish               |
//! | `subscriber`               | system   | Read published content; manage own profile    |
//! | `content_manager_template` | template | Starting point for custom authoring roles     |
//! | `moderator_template`       | template | Starting point for custom moderation roles    |

use super::registry::{perms, registry};

/// Predefined roles seeded at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedRole {
    Admin,
    Editor,
    Author,
    Contributor,
    Subscriber,
    ContentManagerTemplate,
    ModeratorTemplate,
}

const PROFILE_SELF: &[&str] = &[perms::USERS_READ_SELF, perms::USERS_UPDATE_SELF];

const AUTHOR_POSTS: &[&str] = &[
    perms::POSTS_CREATE,
    perms::POSTS_READ_PUBLISHED,
    perms::POSTS_READ_DRAFT_OWN,
    perms::POSTS_UPDATE_OWN,
    perms::POSTS_DELETE_OWN,
    perms::POSTS_PUBLISH_OWN,
];

impl PredefinedRole {
    /// The unique role name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Author => "author",
            Self::Contributor => "contributor",
            Self::Subscriber => "subscriber",
            Self::ContentManagerTemplate => "content_manager_template",
            Self::ModeratorTemplate => "moderator_template",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Admin => "Full access to all content, users and authorization settings",
            Self::Editor => "Manage any post or theme and read any user profile",
            Self::Author => "Write, edit and publish own posts",
            Self::Contributor => "Write and edit own posts; publishing requires review",
            Self::Subscriber => "Read published content and manage own profile",
            Self::ContentManagerTemplate => "Template for custom content authoring roles",
            Self::ModeratorTemplate => "Template for custom moderation roles",
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self, Self::ContentManagerTemplate | Self::ModeratorTemplate)
    }

    /// Built-in roles are protected from deletion and ordinary edits.
    /// Templates stay editable so operators can curate them.
    pub fn is_system(&self) -> bool {
        !self.is_template()
    }

    /// Canonical permission identifiers granted by this role.
    pub fn permissions(&self) -> Vec<&'static str> {
        match self {
            Self::Admin => registry().all().iter().map(|p| p.id.as_str()).collect(),
            Self::Editor => {
                let mut ids: Vec<&'static str> = registry()
                    .by_resource("posts")
                    .chain(registry().by_resource("themes"))
                    .map(|p| p.id.as_str())
                    .collect();
                ids.push(perms::USERS_READ_ANY);
                ids.extend_from_slice(PROFILE_SELF);
                ids
            }
            Self::Author => {
                let mut ids = AUTHOR_POSTS.to_vec();
                ids.push(perms::THEMES_READ);
                ids.extend_from_slice(PROFILE_SELF);
                ids
            }
            Self::Contributor => {
                let mut ids: Vec<&'static str> = AUTHOR_POSTS
                    .iter()
                    .copied()
                    .filter(|p| *p != perms::POSTS_PUBLISH_OWN)
                    .collect();
                ids.push(perms::THEMES_READ);
                ids.extend_from_slice(PROFILE_SELF);
                ids
            }
            Self::Subscriber => {
                let mut ids = vec![perms::POSTS_READ_PUBLISHED, perms::THEMES_READ];
                ids.extend_from_slice(PROFILE_SELF);
                ids
            }
            Self::ContentManagerTemplate => {
                let mut ids = AUTHOR_POSTS.to_vec();
                ids.push(perms::THEMES_READ);
                ids
            }
            Self::ModeratorTemplate => vec![
                perms::POSTS_READ_PUBLISHED,
                perms::POSTS_READ_DRAFT_ANY,
                perms::POSTS_UPDATE_ANY,
                perms::POSTS_DELETE_ANY,
                perms::USERS_READ_ANY,
            ],
        }
    }

    pub fn all() -> Vec<PredefinedRole> {
        vec![
            Self::Admin,
            Self::Editor,
            Self::Author,
            Self::Contributor,
            Self::Subscriber,
            Self::ContentManagerTemplate,
            Self::ModeratorTemplate,
        ]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|r| r.name() == name)
    }
}
