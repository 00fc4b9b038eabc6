//! Authorization collaborator and caller capabilities
//!
//! Role and group ownership are resolved by an `Authorizer`; the result is
//! turned into a `Capabilities` set once per request and passed to the
//! services, which never look at roles directly.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use turan_common::db::Role;

use crate::db::activity;
use crate::error::{HomeworkError, HwResult};

/// Resolves callers to roles and checks teacher-to-group ownership
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Role of `user_id`, `None` for unknown users
    async fn role_of(&self, user_id: Uuid) -> HwResult<Option<Role>>;

    /// Whether `teacher_id` is the assigned teacher of `group_id`
    async fn teaches_group(&self, teacher_id: Uuid, group_id: Uuid) -> HwResult<bool>;
}

/// Authorizer backed by the shared `users` and `groups` tables
#[derive(Debug, Clone)]
pub struct DbAuthorizer {
    db: SqlitePool,
}

impl DbAuthorizer {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Authorizer for DbAuthorizer {
    async fn role_of(&self, user_id: Uuid) -> HwResult<Option<Role>> {
        Ok(activity::user_role(&self.db, user_id).await?)
    }

    async fn teaches_group(&self, teacher_id: Uuid, group_id: Uuid) -> HwResult<bool> {
        let teacher = activity::group_teacher(&self.db, group_id).await?;
        Ok(teacher == Some(teacher_id))
    }
}

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    /// Resolve `user_id` through the authorizer
    pub async fn resolve(authorizer: &dyn Authorizer, user_id: Uuid) -> HwResult<Self> {
        match authorizer.role_of(user_id).await? {
            Some(role) => Ok(Self { user_id, role }),
            None => Err(HomeworkError::Forbidden(format!("Unknown user {}", user_id))),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// What a caller may do with one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub admin: bool,
    /// Teacher of the resource's group
    pub teacher: bool,
    pub student: bool,
    /// The resource belongs to the caller
    pub owner: bool,
}

impl Capabilities {
    /// Evaluate for a resource owned by `owner_id` in `group_id`
    pub async fn evaluate(
        authorizer: &dyn Authorizer,
        caller: &Caller,
        group_id: Uuid,
        owner_id: Option<Uuid>,
    ) -> HwResult<Self> {
        let teacher = match caller.role {
            Role::Teacher => authorizer.teaches_group(caller.user_id, group_id).await?,
            _ => false,
        };

        Ok(Self {
            admin: caller.role == Role::Admin,
            teacher,
            student: caller.role == Role::Student,
            owner: owner_id == Some(caller.user_id),
        })
    }

    /// Admin or the group's teacher
    pub fn can_review(&self) -> bool {
        self.admin || self.teacher
    }

    /// Reviewers and the owner may read a record
    pub fn can_view(&self) -> bool {
        self.can_review() || self.owner
    }

    pub fn require_review(&self, what: &str) -> HwResult<()> {
        if self.can_review() {
            Ok(())
        } else {
            Err(HomeworkError::Forbidden(format!(
                "Only the group's teacher or an admin may {}",
                what
            )))
        }
    }
}
