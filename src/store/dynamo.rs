//! DynamoDB-backed stores.
//!
//! # Tables
//!
//! - `cla-{stage}-github-orgs` / `cla-{stage}-gitlab-orgs`, keyed by
//!   `organization_id`, with a lowercase-name index and a project index
//! - `cla-{stage}-repositories`, keyed by `repository_id`, with an
//!   organization-name index and an external-id index
//! - `cla-{stage}-signatures`, keyed by `signature_id`; only the
//!   `github_org_whitelist` list attribute is written here
//!
//! Create-only writes use `attribute_not_exists` conditions; a failed
//! condition becomes [`StoreError::AlreadyExists`]. Organization names are
//! reserved by a key-only guard row (`organization-name#{lowercase name}`)
//! written in the same transaction as the record, so two concurrent
//! registrations of one name cannot both succeed. Guard rows carry no indexed
//! attributes and never show up in index queries.
//!
//! The repositories table is shared by both providers. Rows are filtered on
//! `repository_type` after decoding; rows without one are GitHub rows.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Delete, Put, ReturnValue, TransactWriteItem};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use super::{
    OrganizationStore, RepositoryStore, SignatureStore, StoreError, select_by_external_id,
};
use crate::types::{
    ClaGroupId, ExternalRepoId, InstallationId, Organization, OrganizationId,
    OrganizationSettings, ProjectSfid, Provider, Repository, RepositoryId, Signature, SignatureId,
};

type Item = HashMap<String, AttributeValue>;

const REPOSITORY_ORG_INDEX: &str = "repository-organization-name-external-id-index";
const REPOSITORY_EXTERNAL_INDEX: &str = "external-repository-index";
const NAME_GUARD_PREFIX: &str = "organization-name#";

/// Organization table for one provider.
#[derive(Debug, Clone)]
pub struct DynamoOrganizationStore {
    client: Client,
    table: String,
    provider: Provider,
}

impl DynamoOrganizationStore {
    pub fn new(client: Client, table: impl Into<String>, provider: Provider) -> Self {
        Self {
            client,
            table: table.into(),
            provider,
        }
    }

    fn name_index(&self) -> &'static str {
        match self.provider {
            Provider::Github => "github-organization-name-lower-search-index",
            Provider::Gitlab => "gitlab-organization-name-lower-search-index",
        }
    }

    fn project_index(&self) -> &'static str {
        match self.provider {
            Provider::Github => "github-project-sfid-organization-name-index",
            Provider::Gitlab => "gitlab-project-sfid-organization-name-index",
        }
    }

    fn key(id: &OrganizationId) -> (&'static str, AttributeValue) {
        ("organization_id", AttributeValue::S(id.to_string()))
    }

    /// Runs `SET` assignments on one row, failing with `NotFound` if it is
    /// absent, and returns the updated row.
    async fn update(
        &self,
        id: &OrganizationId,
        assignments: Vec<(&'static str, AttributeValue)>,
    ) -> Result<Item, StoreError> {
        let mut expression = Vec::with_capacity(assignments.len() + 1);
        let (key_name, key_value) = Self::key(id);
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table)
            .key(key_name, key_value)
            .condition_expression("attribute_exists(organization_id)")
            .return_values(ReturnValue::AllNew);

        let all = assignments
            .into_iter()
            .chain(std::iter::once(("date_modified", timestamp(Utc::now()))));
        for (i, (attr, value)) in all.enumerate() {
            expression.push(format!("#a{i} = :v{i}"));
            request = request
                .expression_attribute_names(format!("#a{i}"), attr)
                .expression_attribute_values(format!(":v{i}"), value);
        }

        let output = request
            .update_expression(format!("SET {}", expression.join(", ")))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    StoreError::organization_not_found(id)
                } else {
                    backend_error(e)
                }
            })?;

        Ok(output.attributes().cloned().unwrap_or_default())
    }
}

#[async_trait]
impl OrganizationStore for DynamoOrganizationStore {
    async fn get_organization(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<Organization>, StoreError> {
        let (key_name, key_value) = Self::key(id);
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(key_name, key_value)
            .send()
            .await
            .map_err(backend_error)?;

        output
            .item()
            .map(|item| organization_from_item(item, self.provider))
            .transpose()
    }

    async fn get_organization_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Organization>, StoreError> {
        let items = query_all(
            &self.client,
            &self.table,
            self.name_index(),
            "organization_name_lower",
            AttributeValue::S(name.to_lowercase()),
        )
        .await?;

        items
            .first()
            .map(|item| organization_from_item(item, self.provider))
            .transpose()
    }

    async fn list_organizations_by_project(
        &self,
        project_sfid: &ProjectSfid,
    ) -> Result<Vec<Organization>, StoreError> {
        let items = query_all(
            &self.client,
            &self.table,
            self.project_index(),
            "project_sfid",
            AttributeValue::S(project_sfid.to_string()),
        )
        .await?;

        debug!(
            project_sfid = %project_sfid,
            table = %self.table,
            count = items.len(),
            "Loaded organizations"
        );
        items
            .iter()
            .map(|item| organization_from_item(item, self.provider))
            .collect()
    }

    async fn put_organization(&self, organization: &Organization) -> Result<(), StoreError> {
        self.client
            .transact_write_items()
            .set_transact_items(Some(organization_create_items(&self.table, organization)?))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(cancelled_by_condition) {
                    StoreError::AlreadyExists {
                        entity: "organization",
                        key: organization.name.clone(),
                    }
                } else {
                    backend_error(e)
                }
            })?;
        Ok(())
    }

    async fn update_settings(
        &self,
        id: &OrganizationId,
        settings: &OrganizationSettings,
    ) -> Result<Organization, StoreError> {
        let group = settings
            .auto_enabled_cla_group_id
            .as_ref()
            .map(|g| AttributeValue::S(g.to_string()))
            .unwrap_or(AttributeValue::Null(true));
        let item = self
            .update(
                id,
                vec![
                    ("auto_enabled", AttributeValue::Bool(settings.auto_enabled)),
                    ("auto_enabled_cla_group_id", group),
                    (
                        "branch_protection_enabled",
                        AttributeValue::Bool(settings.branch_protection_enabled),
                    ),
                ],
            )
            .await?;
        organization_from_item(&item, self.provider)
    }

    async fn set_installation_id(
        &self,
        id: &OrganizationId,
        installation_id: Option<InstallationId>,
    ) -> Result<(), StoreError> {
        let value = installation_id
            .map(|i| AttributeValue::N(i.0.to_string()))
            .unwrap_or(AttributeValue::Null(true));
        self.update(id, vec![("organization_installation_id", value)])
            .await
            .map(drop)
    }

    async fn update_auth_info(
        &self,
        id: &OrganizationId,
        auth_info: &str,
    ) -> Result<(), StoreError> {
        self.update(id, vec![("auth_info", AttributeValue::S(auth_info.to_string()))])
            .await
            .map(drop)
    }

    async fn delete_organization(&self, id: &OrganizationId) -> Result<(), StoreError> {
        let Some(organization) = self.get_organization(id).await? else {
            return Ok(());
        };

        let delete = |key: AttributeValue| {
            Delete::builder()
                .table_name(&self.table)
                .key("organization_id", key)
                .build()
                .map_err(backend_error)
        };
        let (_, record_key) = Self::key(id);
        let record = delete(record_key)?;
        let guard = delete(name_guard_key(&organization.name_lower))?;

        self.client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().delete(record).build())
            .transact_items(TransactWriteItem::builder().delete(guard).build())
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}

/// The shared repositories table.
#[derive(Debug, Clone)]
pub struct DynamoRepositoryStore {
    client: Client,
    table: String,
}

impl DynamoRepositoryStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    async fn set_enabled(
        &self,
        id: &RepositoryId,
        enabled: bool,
        cla_group_id: Option<&ClaGroupId>,
    ) -> Result<(), StoreError> {
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("repository_id", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(repository_id)")
            .expression_attribute_names("#e", "enabled")
            .expression_attribute_names("#m", "date_modified")
            .expression_attribute_values(":e", AttributeValue::Bool(enabled))
            .expression_attribute_values(":m", timestamp(Utc::now()));

        request = match cla_group_id {
            Some(group) => request
                .expression_attribute_names("#g", "repository_cla_group_id")
                .expression_attribute_values(":g", AttributeValue::S(group.to_string()))
                .update_expression("SET #e = :e, #m = :m, #g = :g"),
            None => request.update_expression("SET #e = :e, #m = :m"),
        };

        request.send().await.map_err(|e| {
            if e.as_service_error()
                .is_some_and(|se| se.is_conditional_check_failed_exception())
            {
                StoreError::repository_not_found(id)
            } else {
                backend_error(e)
            }
        })?;
        Ok(())
    }
}

#[async_trait]
impl RepositoryStore for DynamoRepositoryStore {
    async fn get_repositories_by_organization(
        &self,
        provider: Provider,
        organization_name: &str,
    ) -> Result<Vec<Repository>, StoreError> {
        let items = query_all(
            &self.client,
            &self.table,
            REPOSITORY_ORG_INDEX,
            "repository_organization_name",
            AttributeValue::S(organization_name.to_string()),
        )
        .await?;
        repositories_of_provider(&items, provider)
    }

    async fn get_repository_by_external_id(
        &self,
        provider: Provider,
        external_id: ExternalRepoId,
        enabled_only: bool,
    ) -> Result<Option<Repository>, StoreError> {
        let items = query_all(
            &self.client,
            &self.table,
            REPOSITORY_EXTERNAL_INDEX,
            "repository_external_id",
            AttributeValue::S(external_id.to_string()),
        )
        .await?;
        Ok(select_by_external_id(
            repositories_of_provider(&items, provider)?,
            enabled_only,
        ))
    }

    async fn put_repository(&self, repository: &Repository) -> Result<(), StoreError> {
        // The (provider, organization, external id) triple is checked through
        // the index; the condition only guards the primary key.
        let existing = self
            .get_repositories_by_organization(repository.provider, &repository.organization_name)
            .await?;
        if existing
            .iter()
            .any(|r| r.external_id == repository.external_id)
        {
            return Err(StoreError::AlreadyExists {
                entity: "repository",
                key: format!("{}#{}", repository.organization_name, repository.external_id),
            });
        }

        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(repository_to_item(repository)))
            .condition_expression("attribute_not_exists(repository_id)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    StoreError::AlreadyExists {
                        entity: "repository",
                        key: repository.id.to_string(),
                    }
                } else {
                    backend_error(e)
                }
            })?;
        Ok(())
    }

    async fn enable_repository(
        &self,
        id: &RepositoryId,
        cla_group_id: &ClaGroupId,
    ) -> Result<(), StoreError> {
        self.set_enabled(id, true, Some(cla_group_id)).await
    }

    async fn disable_repository(&self, id: &RepositoryId) -> Result<(), StoreError> {
        self.set_enabled(id, false, None).await
    }
}

/// The signatures table.
#[derive(Debug, Clone)]
pub struct DynamoSignatureStore {
    client: Client,
    table: String,
}

impl DynamoSignatureStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl SignatureStore for DynamoSignatureStore {
    async fn get_signature(&self, id: &SignatureId) -> Result<Option<Signature>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("signature_id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(backend_error)?;
        output.item().map(signature_from_item).transpose()
    }

    async fn set_github_org_approval_list(
        &self,
        id: &SignatureId,
        organizations: &[String],
    ) -> Result<(), StoreError> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key("signature_id", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(signature_id)")
            .update_expression("SET #l = :l, #m = :m")
            .expression_attribute_names("#l", "github_org_whitelist")
            .expression_attribute_names("#m", "date_modified")
            .expression_attribute_values(":l", approval_list_value(organizations))
            .expression_attribute_values(":m", timestamp(Utc::now()))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    StoreError::signature_not_found(id)
                } else {
                    backend_error(e)
                }
            })?;

        debug!(
            signature_id = %id,
            organizations = organizations.len(),
            "Stored GitHub organization approval list"
        );
        Ok(())
    }
}

// ─── Query helpers ───

async fn query_all(
    client: &Client,
    table: &str,
    index: &str,
    key_name: &str,
    key_value: AttributeValue,
) -> Result<Vec<Item>, StoreError> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let output = client
            .query()
            .table_name(table)
            .index_name(index)
            .key_condition_expression("#k = :v")
            .expression_attribute_names("#k", key_name)
            .expression_attribute_values(":v", key_value.clone())
            .set_exclusive_start_key(start_key.take())
            .send()
            .await
            .map_err(backend_error)?;

        items.extend(output.items().iter().cloned());

        match output.last_evaluated_key() {
            Some(key) if !key.is_empty() => start_key = Some(key.clone()),
            _ => break,
        }
    }

    Ok(items)
}

fn backend_error(err: impl std::error::Error) -> StoreError {
    StoreError::Backend(DisplayErrorContext(&err).to_string())
}

fn cancelled_by_condition(err: &TransactWriteItemsError) -> bool {
    match err {
        TransactWriteItemsError::TransactionCanceledException(cancelled) => cancelled
            .cancellation_reasons()
            .iter()
            .any(|reason| reason.code() == Some("ConditionalCheckFailed")),
        _ => false,
    }
}

// ─── Item mapping ───

fn timestamp(t: DateTime<Utc>) -> AttributeValue {
    AttributeValue::S(t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn name_guard_key(name_lower: &str) -> AttributeValue {
    AttributeValue::S(format!("{NAME_GUARD_PREFIX}{name_lower}"))
}

fn name_guard_item(name_lower: &str) -> Item {
    Item::from([("organization_id".to_string(), name_guard_key(name_lower))])
}

/// Guard row then record, each only written if its key is unused.
fn organization_create_items(
    table: &str,
    organization: &Organization,
) -> Result<Vec<TransactWriteItem>, StoreError> {
    [
        name_guard_item(&organization.name_lower),
        organization_to_item(organization),
    ]
    .into_iter()
    .map(|item| {
        let put = Put::builder()
            .table_name(table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(organization_id)")
            .build()
            .map_err(backend_error)?;
        Ok(TransactWriteItem::builder().put(put).build())
    })
    .collect()
}

fn organization_to_item(org: &Organization) -> Item {
    let mut item = Item::new();
    item.insert("organization_id".into(), AttributeValue::S(org.id.to_string()));
    item.insert("organization_name".into(), AttributeValue::S(org.name.clone()));
    item.insert(
        "organization_name_lower".into(),
        AttributeValue::S(org.name_lower.clone()),
    );
    item.insert("project_sfid".into(), AttributeValue::S(org.project_sfid.to_string()));
    item.insert(
        "organization_sfid".into(),
        AttributeValue::S(org.parent_project_sfid.to_string()),
    );
    if let Some(id) = org.installation_id {
        item.insert(
            "organization_installation_id".into(),
            AttributeValue::N(id.0.to_string()),
        );
    }
    if let Some(auth) = &org.auth_info {
        item.insert("auth_info".into(), AttributeValue::S(auth.clone()));
    }
    if let Some(state) = &org.auth_state {
        item.insert("auth_state".into(), AttributeValue::S(state.clone()));
    }
    item.insert(
        "auto_enabled".into(),
        AttributeValue::Bool(org.settings.auto_enabled),
    );
    if let Some(group) = &org.settings.auto_enabled_cla_group_id {
        item.insert(
            "auto_enabled_cla_group_id".into(),
            AttributeValue::S(group.to_string()),
        );
    }
    item.insert(
        "branch_protection_enabled".into(),
        AttributeValue::Bool(org.settings.branch_protection_enabled),
    );
    item.insert("enabled".into(), AttributeValue::Bool(org.enabled));
    item.insert("date_created".into(), timestamp(org.date_created));
    item.insert("date_modified".into(), timestamp(org.date_modified));
    item.insert("version".into(), AttributeValue::S(org.version.clone()));
    item
}

fn organization_from_item(item: &Item, provider: Provider) -> Result<Organization, StoreError> {
    let row = Row::new(item, "organization");
    let name = row.string("organization_name")?;
    Ok(Organization {
        id: OrganizationId::new(row.string("organization_id")?),
        provider,
        name_lower: row
            .opt_string("organization_name_lower")
            .unwrap_or_else(|| name.to_lowercase()),
        name,
        project_sfid: ProjectSfid::new(row.string("project_sfid")?),
        parent_project_sfid: ProjectSfid::new(row.opt_string("organization_sfid").unwrap_or_default()),
        installation_id: row
            .opt_u64("organization_installation_id")?
            .filter(|id| *id != 0)
            .map(InstallationId),
        auth_info: row.opt_string("auth_info").filter(|s| !s.is_empty()),
        auth_state: row.opt_string("auth_state"),
        settings: OrganizationSettings {
            auto_enabled: row.bool_or("auto_enabled", false),
            auto_enabled_cla_group_id: row
                .opt_string("auto_enabled_cla_group_id")
                .filter(|s| !s.is_empty())
                .map(ClaGroupId::new),
            branch_protection_enabled: row.bool_or("branch_protection_enabled", false),
        },
        enabled: row.bool_or("enabled", true),
        date_created: row.time("date_created")?,
        date_modified: row.time("date_modified")?,
        version: row.opt_string("version").unwrap_or_default(),
    })
}

fn repository_to_item(repo: &Repository) -> Item {
    let mut item = Item::new();
    let mut put = |k: &str, v: AttributeValue| {
        item.insert(k.to_string(), v);
    };
    put("repository_id", AttributeValue::S(repo.id.to_string()));
    put(
        "repository_external_id",
        AttributeValue::S(repo.external_id.to_string()),
    );
    put("repository_name", AttributeValue::S(repo.name.clone()));
    put("repository_full_name", AttributeValue::S(repo.full_name.clone()));
    put("repository_url", AttributeValue::S(repo.url.clone()));
    put(
        "repository_organization_name",
        AttributeValue::S(repo.organization_name.clone()),
    );
    put(
        "repository_cla_group_id",
        AttributeValue::S(repo.cla_group_id.to_string()),
    );
    put(
        "repository_project_sfid",
        AttributeValue::S(repo.project_sfid.to_string()),
    );
    put(
        "project_sfid",
        AttributeValue::S(repo.parent_project_sfid.to_string()),
    );
    put("repository_type", AttributeValue::S(repo.provider.to_string()));
    put("enabled", AttributeValue::Bool(repo.enabled));
    put("date_created", timestamp(repo.date_created));
    put("date_modified", timestamp(repo.date_modified));
    item
}

fn repositories_of_provider(items: &[Item], provider: Provider) -> Result<Vec<Repository>, StoreError> {
    let mut repositories = Vec::with_capacity(items.len());
    for item in items {
        let repository = repository_from_item(item)?;
        if repository.provider == provider {
            repositories.push(repository);
        }
    }
    Ok(repositories)
}

fn repository_from_item(item: &Item) -> Result<Repository, StoreError> {
    let row = Row::new(item, "repository");
    let external_raw = row.string("repository_external_id")?;
    let external_id = external_raw
        .parse::<u64>()
        .map_err(|_| row.malformed("repository_external_id", &external_raw))?;
    let provider = match row.opt_string("repository_type").as_deref() {
        Some("gitlab") => Provider::Gitlab,
        _ => Provider::Github,
    };
    let name = row.string("repository_name")?;
    Ok(Repository {
        id: RepositoryId::new(row.string("repository_id")?),
        external_id: ExternalRepoId(external_id),
        full_name: row.opt_string("repository_full_name").unwrap_or_else(|| name.clone()),
        name,
        url: row.opt_string("repository_url").unwrap_or_default(),
        organization_name: row.string("repository_organization_name")?,
        cla_group_id: ClaGroupId::new(row.opt_string("repository_cla_group_id").unwrap_or_default()),
        project_sfid: ProjectSfid::new(row.opt_string("repository_project_sfid").unwrap_or_default()),
        parent_project_sfid: ProjectSfid::new(row.opt_string("project_sfid").unwrap_or_default()),
        provider,
        enabled: row.bool_or("enabled", false),
        date_created: row.time("date_created")?,
        date_modified: row.time("date_modified")?,
    })
}

fn approval_list_value(organizations: &[String]) -> AttributeValue {
    AttributeValue::L(
        organizations
            .iter()
            .map(|name| AttributeValue::S(name.clone()))
            .collect(),
    )
}

fn signature_from_item(item: &Item) -> Result<Signature, StoreError> {
    let row = Row::new(item, "signature");
    let company_id = match row.opt_string("signature_reference_type").as_deref() {
        Some("company") => row.opt_string("signature_reference_id"),
        _ => None,
    };
    let github_org_approval_list = match item.get("github_org_whitelist") {
        None | Some(AttributeValue::Null(_)) => Vec::new(),
        Some(AttributeValue::L(values)) => values
            .iter()
            .filter_map(|v| v.as_s().ok().cloned())
            .collect(),
        Some(AttributeValue::Ss(values)) => values.clone(),
        Some(other) => return Err(row.malformed("github_org_whitelist", &format!("{other:?}"))),
    };
    Ok(Signature {
        id: SignatureId::new(row.string("signature_id")?),
        cla_group_id: ClaGroupId::new(row.opt_string("signature_project_id").unwrap_or_default()),
        company_id,
        github_org_approval_list,
    })
}

/// Typed accessors over one DynamoDB item.
struct Row<'a> {
    item: &'a Item,
    entity: &'static str,
}

impl<'a> Row<'a> {
    fn new(item: &'a Item, entity: &'static str) -> Self {
        Self { item, entity }
    }

    fn malformed(&self, attr: &str, detail: &str) -> StoreError {
        StoreError::Malformed {
            entity: self.entity,
            reason: format!("{attr}: {detail}"),
        }
    }

    fn opt_string(&self, attr: &str) -> Option<String> {
        self.item
            .get(attr)
            .and_then(|v| v.as_s().ok())
            .cloned()
    }

    fn string(&self, attr: &str) -> Result<String, StoreError> {
        self.opt_string(attr)
            .ok_or_else(|| self.malformed(attr, "missing string attribute"))
    }

    fn opt_u64(&self, attr: &str) -> Result<Option<u64>, StoreError> {
        match self.item.get(attr) {
            None | Some(AttributeValue::Null(_)) => Ok(None),
            Some(AttributeValue::N(n)) | Some(AttributeValue::S(n)) => n
                .parse()
                .map(Some)
                .map_err(|_| self.malformed(attr, n)),
            Some(other) => Err(self.malformed(attr, &format!("{other:?}"))),
        }
    }

    fn bool_or(&self, attr: &str, default: bool) -> bool {
        self.item
            .get(attr)
            .and_then(|v| v.as_bool().ok())
            .copied()
            .unwrap_or(default)
    }

    fn time(&self, attr: &str) -> Result<DateTime<Utc>, StoreError> {
        match self.opt_string(attr) {
            None => Ok(DateTime::<Utc>::UNIX_EPOCH),
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| self.malformed(attr, &raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{github_org, gitlab_repo, local_repo};

    #[test]
    fn organization_item_mapping_preserves_fields() {
        let mut org = github_org("Acme", "proj-1");
        org.installation_id = Some(InstallationId(42));
        org.settings.auto_enabled = true;
        org.settings.auto_enabled_cla_group_id = Some(ClaGroupId::from("group-1"));

        let item = organization_to_item(&org);
        assert_eq!(
            item.get("organization_name_lower"),
            Some(&AttributeValue::S("acme".into()))
        );

        let back = organization_from_item(&item, Provider::Github).unwrap();
        assert_eq!(back.id, org.id);
        assert_eq!(back.installation_id, Some(InstallationId(42)));
        assert_eq!(back.settings, org.settings);
        assert_eq!(back.parent_project_sfid, org.parent_project_sfid);
    }

    #[test]
    fn zero_installation_id_reads_as_absent() {
        let mut item = organization_to_item(&github_org("acme", "p"));
        item.insert(
            "organization_installation_id".into(),
            AttributeValue::N("0".into()),
        );
        let org = organization_from_item(&item, Provider::Github).unwrap();
        assert_eq!(org.installation_id, None);
    }

    #[test]
    fn missing_name_is_malformed() {
        let mut item = organization_to_item(&github_org("acme", "p"));
        item.remove("organization_name");
        let err = organization_from_item(&item, Provider::Github).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { entity: "organization", .. }));
    }

    #[test]
    fn name_guard_is_key_only_and_case_insensitive() {
        let upper = github_org("ACME", "p1");
        let lower = github_org("acme", "p2");

        let guard = name_guard_item(&upper.name_lower);
        assert_eq!(guard, name_guard_item(&lower.name_lower));
        assert_eq!(guard.len(), 1);
        assert_eq!(
            guard.get("organization_id"),
            Some(&AttributeValue::S("organization-name#acme".into()))
        );
        // Distinct from any record key, and absent from both indexes.
        assert_ne!(guard.get("organization_id"), organization_to_item(&upper).get("organization_id"));
        assert!(!guard.contains_key("organization_name_lower"));
        assert!(!guard.contains_key("project_sfid"));
    }

    #[test]
    fn organization_create_is_conditional_on_guard_and_record() {
        let org = github_org("Acme", "p1");
        let items = organization_create_items("cla-dev-github-orgs", &org).unwrap();
        assert_eq!(items.len(), 2);

        let puts: Vec<&Put> = items.iter().filter_map(|i| i.put()).collect();
        assert_eq!(puts.len(), 2);
        for put in &puts {
            assert_eq!(put.table_name(), "cla-dev-github-orgs");
            assert_eq!(
                put.condition_expression(),
                Some("attribute_not_exists(organization_id)")
            );
        }
        assert_eq!(puts[0].item(), &name_guard_item("acme"));
        assert_eq!(puts[1].item(), &organization_to_item(&org));
    }

    #[test]
    fn only_condition_failures_count_as_duplicates() {
        use aws_sdk_dynamodb::types::CancellationReason;
        use aws_sdk_dynamodb::types::error::TransactionCanceledException;

        let cancelled = |codes: &[&str]| {
            let mut builder = TransactionCanceledException::builder();
            for code in codes {
                builder = builder.cancellation_reasons(CancellationReason::builder().code(*code).build());
            }
            TransactWriteItemsError::TransactionCanceledException(builder.build())
        };

        assert!(cancelled_by_condition(&cancelled(&["ConditionalCheckFailed", "None"])));
        assert!(cancelled_by_condition(&cancelled(&["None", "ConditionalCheckFailed"])));
        assert!(!cancelled_by_condition(&cancelled(&["ThrottlingError", "None"])));
    }

    #[test]
    fn repository_rows_are_filtered_by_provider() {
        let github = local_repo("acme", 500, "gh", true);
        let gitlab = gitlab_repo("acme", 500, "gl", true);
        let mut legacy = repository_to_item(&local_repo("acme", 501, "old", true));
        legacy.remove("repository_type");
        let items = vec![
            repository_to_item(&github),
            repository_to_item(&gitlab),
            legacy,
        ];

        let gitlab_rows = repositories_of_provider(&items, Provider::Gitlab).unwrap();
        assert_eq!(gitlab_rows.len(), 1);
        assert_eq!(gitlab_rows[0].id, gitlab.id);

        let github_rows = repositories_of_provider(&items, Provider::Github).unwrap();
        let ids: Vec<_> = github_rows.iter().map(|r| r.external_id.0).collect();
        assert_eq!(ids, vec![500, 501]);
    }

    fn signature_item(list: Option<AttributeValue>) -> Item {
        let mut item = Item::from([
            ("signature_id".to_string(), AttributeValue::S("sig-1".into())),
            ("signature_project_id".to_string(), AttributeValue::S("g1".into())),
            ("signature_reference_id".to_string(), AttributeValue::S("company-1".into())),
            ("signature_reference_type".to_string(), AttributeValue::S("company".into())),
        ]);
        if let Some(list) = list {
            item.insert("github_org_whitelist".into(), list);
        }
        item
    }

    #[test]
    fn signature_approval_list_is_read_from_list_or_set() {
        let names = vec!["acme".to_string(), "Widgets".to_string()];

        let from_list = signature_from_item(&signature_item(Some(approval_list_value(&names)))).unwrap();
        assert_eq!(from_list.github_org_approval_list, names);
        assert_eq!(from_list.cla_group_id, ClaGroupId::from("g1"));
        assert_eq!(from_list.company_id.as_deref(), Some("company-1"));

        let from_set =
            signature_from_item(&signature_item(Some(AttributeValue::Ss(names.clone())))).unwrap();
        assert_eq!(from_set.github_org_approval_list, names);

        let absent = signature_from_item(&signature_item(None)).unwrap();
        assert!(absent.github_org_approval_list.is_empty());

        let bad = signature_from_item(&signature_item(Some(AttributeValue::Bool(true))));
        assert!(matches!(bad, Err(StoreError::Malformed { entity: "signature", .. })));
    }

    #[test]
    fn individual_signature_has_no_company() {
        let mut item = signature_item(None);
        item.insert("signature_reference_type".into(), AttributeValue::S("user".into()));
        assert_eq!(signature_from_item(&item).unwrap().company_id, None);
    }

    #[test]
    fn repository_external_id_is_stored_as_string() {
        let repo = local_repo("acme", 101, "api", true);
        let item = repository_to_item(&repo);
        assert_eq!(
            item.get("repository_external_id"),
            Some(&AttributeValue::S("101".into()))
        );
        let back = repository_from_item(&item).unwrap();
        assert_eq!(back.external_id, ExternalRepoId(101));
        assert!(back.enabled);
    }

    #[test]
    fn non_numeric_external_id_is_malformed() {
        let mut item = repository_to_item(&local_repo("acme", 1, "x", true));
        item.insert(
            "repository_external_id".into(),
            AttributeValue::S("abc".into()),
        );
        assert!(matches!(
            repository_from_item(&item),
            Err(StoreError::Malformed { .. })
        ));
    }
}
