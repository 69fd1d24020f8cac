//! In-memory stores.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    OrganizationStore, RepositoryStore, SignatureStore, StoreError, select_by_external_id,
};
use crate::types::{
    ClaGroupId, ExternalRepoId, InstallationId, Organization, OrganizationId,
    OrganizationSettings, ProjectSfid, Provider, Repository, RepositoryId, Signature, SignatureId,
};

#[derive(Debug, Default)]
pub struct MemoryOrganizationStore {
    rows: RwLock<HashMap<OrganizationId, Organization>>,
}

impl MemoryOrganizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn modify<T>(
        &self,
        id: &OrganizationId,
        f: impl FnOnce(&mut Organization) -> T,
    ) -> Result<T, StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let org = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::organization_not_found(id))?;
        let out = f(org);
        org.date_modified = Utc::now();
        Ok(out)
    }
}

#[async_trait]
impl OrganizationStore for MemoryOrganizationStore {
    async fn get_organization(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<Organization>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.get(id).cloned())
    }

    async fn get_organization_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Organization>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.values().find(|o| o.matches_name(name)).cloned())
    }

    async fn list_organizations_by_project(
        &self,
        project_sfid: &ProjectSfid,
    ) -> Result<Vec<Organization>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut orgs: Vec<_> = rows
            .values()
            .filter(|o| &o.project_sfid == project_sfid)
            .cloned()
            .collect();
        orgs.sort_by(|a, b| a.date_created.cmp(&b.date_created));
        Ok(orgs)
    }

    async fn put_organization(&self, organization: &Organization) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let clash = rows.contains_key(&organization.id)
            || rows
                .values()
                .any(|o| o.name_lower == organization.name_lower);
        if clash {
            return Err(StoreError::AlreadyExists {
                entity: "organization",
                key: organization.name.clone(),
            });
        }
        rows.insert(organization.id.clone(), organization.clone());
        Ok(())
    }

    async fn update_settings(
        &self,
        id: &OrganizationId,
        settings: &OrganizationSettings,
    ) -> Result<Organization, StoreError> {
        self.modify(id, |org| {
            org.settings = settings.clone();
        })?;
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.get(id)
            .cloned()
            .ok_or_else(|| StoreError::organization_not_found(id))
    }

    async fn set_installation_id(
        &self,
        id: &OrganizationId,
        installation_id: Option<InstallationId>,
    ) -> Result<(), StoreError> {
        self.modify(id, |org| org.installation_id = installation_id)
    }

    async fn update_auth_info(
        &self,
        id: &OrganizationId,
        auth_info: &str,
    ) -> Result<(), StoreError> {
        self.modify(id, |org| org.auth_info = Some(auth_info.to_string()))
    }

    async fn delete_organization(&self, id: &OrganizationId) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        rows.remove(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepositoryStore {
    rows: RwLock<HashMap<RepositoryId, Repository>>,
    failing: RwLock<HashSet<RepositoryId>>,
    failing_reads: RwLock<HashSet<String>>,
}

impl MemoryRepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later write to `id` fail with a backend error.
    pub fn fail_writes_to(&self, id: &RepositoryId) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());
    }

    /// Makes every later listing of `organization_name` fail with a backend
    /// error.
    pub fn fail_reads_for(&self, organization_name: &str) {
        self.failing_reads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(organization_name.to_string());
    }

    pub fn all(&self) -> Vec<Repository> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.values().cloned().collect()
    }

    fn modify(&self, id: &RepositoryId, f: impl FnOnce(&mut Repository)) -> Result<(), StoreError> {
        if self
            .failing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
        {
            return Err(StoreError::Backend(format!("write to {id} rejected")));
        }
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let repo = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::repository_not_found(id))?;
        f(repo);
        repo.date_modified = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl RepositoryStore for MemoryRepositoryStore {
    async fn get_repositories_by_organization(
        &self,
        provider: Provider,
        organization_name: &str,
    ) -> Result<Vec<Repository>, StoreError> {
        if self
            .failing_reads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(organization_name)
        {
            return Err(StoreError::Backend(format!(
                "read of {organization_name} rejected"
            )));
        }
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .values()
            .filter(|r| r.provider == provider && r.organization_name == organization_name)
            .cloned()
            .collect())
    }

    async fn get_repository_by_external_id(
        &self,
        provider: Provider,
        external_id: ExternalRepoId,
        enabled_only: bool,
    ) -> Result<Option<Repository>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(select_by_external_id(
            rows.values()
                .filter(|r| r.provider == provider && r.external_id == external_id)
                .cloned(),
            enabled_only,
        ))
    }

    async fn put_repository(&self, repository: &Repository) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let clash = rows.contains_key(&repository.id)
            || rows.values().any(|r| {
                r.provider == repository.provider
                    && r.organization_name == repository.organization_name
                    && r.external_id == repository.external_id
            });
        if clash {
            return Err(StoreError::AlreadyExists {
                entity: "repository",
                key: format!("{}#{}", repository.organization_name, repository.external_id),
            });
        }
        rows.insert(repository.id.clone(), repository.clone());
        Ok(())
    }

    async fn enable_repository(
        &self,
        id: &RepositoryId,
        cla_group_id: &ClaGroupId,
    ) -> Result<(), StoreError> {
        self.modify(id, |repo| {
            repo.enabled = true;
            repo.cla_group_id = cla_group_id.clone();
        })
    }

    async fn disable_repository(&self, id: &RepositoryId) -> Result<(), StoreError> {
        self.modify(id, |repo| repo.enabled = false)
    }
}

#[derive(Debug, Default)]
pub struct MemorySignatureStore {
    rows: RwLock<HashMap<SignatureId, Signature>>,
}

impl MemorySignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a signature; signatures are created elsewhere.
    pub fn insert(&self, signature: Signature) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signature.id.clone(), signature);
    }
}

#[async_trait]
impl SignatureStore for MemorySignatureStore {
    async fn get_signature(&self, id: &SignatureId) -> Result<Option<Signature>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.get(id).cloned())
    }

    async fn set_github_org_approval_list(
        &self,
        id: &SignatureId,
        organizations: &[String],
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let signature = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::signature_not_found(id))?;
        signature.github_org_approval_list = organizations.to_vec();
        Ok(())
    }
}
