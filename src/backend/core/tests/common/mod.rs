//! Shared fixtures: a seeded in-memory store with two users and two posts.

#![allow(dead_code)]

use std::sync::Arc;
use uuid::Uuid;

use scribe_core::rbac::{
    seed, AuthzStore, InMemoryAuthzStore, OwnershipRegistry, PolicyEngine, Role, RoleService,
    StaticOwnershipChecker, UserId,
};

pub struct Fixture {
    pub store: Arc<InMemoryAuthzStore>,
    pub engine: PolicyEngine,
    pub roles: RoleService,
    pub posts: Arc<StaticOwnershipChecker>,
    /// `u` authored `p1`, `v` authored `p2`.
    pub u: UserId,
    pub v: UserId,
    pub p1: Uuid,
    pub p2: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryAuthzStore::new());
        seed(store.as_ref()).await.unwrap();

        let u = UserId::new();
        let v = UserId::new();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();

        let posts = Arc::new(
            StaticOwnershipChecker::new()
                .with_owner(p1, u)
                .with_owner(p2, v),
        );
        let ownership = OwnershipRegistry::new();
        ownership.register("posts", posts.clone());

        let dyn_store: Arc<dyn AuthzStore> = store.clone();
        Self {
            engine: PolicyEngine::new(dyn_store.clone(), ownership),
            roles: RoleService::new(dyn_store),
            store,
            posts,
            u,
            v,
            p1,
            p2,
        }
    }

    pub async fn role(&self, name: &str) -> Role {
        self.store.get_role_by_name(name).await.unwrap()
    }

    pub async fn grant_role(&self, user: UserId, name: &str) {
        let role = self.role(name).await;
        self.roles
            .assign_role_to_user(user, role.id, None)
            .await
            .unwrap();
    }
}
