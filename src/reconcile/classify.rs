//! Pure connection-status classification.
//!
//! Given everything fetched for one organization, [`classify_organization`]
//! produces its view without any I/O. The result depends only on the three
//! input sets (provider listing, local records, installation presence), so
//! reconciling the same inputs twice yields the same view.

use std::collections::{HashMap, HashSet};

use crate::types::{
    ConnectionStatus, ExternalRepoId, Organization, OrganizationView, ProjectOrganizationView,
    ProjectSfid, ProviderRepository, Repository, RepositoryView,
};

/// What the provider said about an organization's repositories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderListing {
    /// The organization has no installation; the provider was not asked.
    NoInstallation,
    /// The listing call failed.
    Failed(String),
    Listed(Vec<ProviderRepository>),
}

/// Everything gathered for one organization.
#[derive(Debug, Clone)]
pub struct OrganizationInput {
    pub organization: Organization,
    pub cla_group_name: Option<String>,
    pub listing: ProviderListing,
    pub local: Vec<Repository>,
}

type RepoKey = (String, ExternalRepoId);

pub fn classify_organization(input: OrganizationInput) -> OrganizationView {
    let OrganizationInput {
        organization: org,
        cla_group_name,
        listing,
        local,
    } = input;

    let (mut status, message, visible) = match listing {
        ProviderListing::NoInstallation => (ConnectionStatus::NoConnection, None, Vec::new()),
        ProviderListing::Failed(reason) => {
            (ConnectionStatus::ConnectionFailure, Some(reason), Vec::new())
        }
        ProviderListing::Listed(repos) => (ConnectionStatus::Connected, None, repos),
    };

    let org_key = org.name_lower.clone();
    let available: HashMap<RepoKey, &ProviderRepository> = visible
        .iter()
        .map(|r| ((org_key.clone(), r.external_id), r))
        .collect();
    let mut claimed: HashSet<RepoKey> = HashSet::new();

    let mut repositories = Vec::with_capacity(local.len() + visible.len());
    for repo in &local {
        let key = (repo.organization_name.to_lowercase(), repo.external_id);
        let repo_status = if available.contains_key(&key) && claimed.insert(key) {
            ConnectionStatus::Connected
        } else {
            if status == ConnectionStatus::Connected {
                status = ConnectionStatus::PartialConnection;
            }
            ConnectionStatus::ConnectionFailure
        };
        repositories.push(RepositoryView {
            repository_id: Some(repo.id.clone()),
            external_id: repo.external_id,
            name: repo.name.clone(),
            url: repo.url.clone(),
            cla_group_id: Some(repo.cla_group_id.clone()),
            enabled: repo.enabled,
            connection_status: repo_status,
        });
    }

    // Provider order, so output does not depend on hash iteration.
    for repo in &visible {
        if claimed.contains(&(org_key.clone(), repo.external_id)) {
            continue;
        }
        repositories.push(RepositoryView {
            repository_id: None,
            external_id: repo.external_id,
            name: repo.name.clone(),
            url: repo.url.clone(),
            cla_group_id: None,
            enabled: false,
            connection_status: ConnectionStatus::Connected,
        });
    }

    sort_repositories(&mut repositories);

    OrganizationView {
        installation_url: org.installation_url(),
        organization_name: org.name,
        provider: org.provider,
        connection_status: status,
        connection_status_message: message,
        auto_enabled: org.settings.auto_enabled,
        auto_enabled_cla_group_id: org.settings.auto_enabled_cla_group_id,
        auto_enabled_cla_group_name: cla_group_name,
        branch_protection_enabled: org.settings.branch_protection_enabled,
        repositories,
    }
}

/// Classifies every organization and sorts the result.
pub fn build_view(
    project_sfid: ProjectSfid,
    inputs: Vec<OrganizationInput>,
) -> ProjectOrganizationView {
    let mut organizations: Vec<_> = inputs.into_iter().map(classify_organization).collect();
    organizations.sort_by(|a, b| {
        a.organization_name
            .to_lowercase()
            .cmp(&b.organization_name.to_lowercase())
            .then_with(|| a.organization_name.cmp(&b.organization_name))
    });
    ProjectOrganizationView {
        project_sfid,
        organizations,
    }
}

fn sort_repositories(repositories: &mut [RepositoryView]) {
    repositories.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.external_id.cmp(&b.external_id))
            .then_with(|| a.repository_id.cmp(&b.repository_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        arb_organization_input, github_org, installed_github_org, local_repo,
    };
    use crate::types::ProviderRepository;
    use proptest::prelude::*;

    fn input(
        org: Organization,
        listing: ProviderListing,
        local: Vec<Repository>,
    ) -> OrganizationInput {
        OrganizationInput {
            organization: org,
            cla_group_name: None,
            listing,
            local,
        }
    }

    fn find(view: &OrganizationView, external_id: u64) -> Vec<&RepositoryView> {
        view.repositories
            .iter()
            .filter(|r| r.external_id == ExternalRepoId(external_id))
            .collect()
    }

    // ─── Scenario tests ───

    #[test]
    fn acme_scenario() {
        let view = classify_organization(input(
            installed_github_org("acme", "p1", 42),
            ProviderListing::Listed(vec![
                ProviderRepository::new(101, "api"),
                ProviderRepository::new(102, "web"),
            ]),
            vec![
                local_repo("acme", 101, "api", true),
                local_repo("acme", 103, "stale", true),
            ],
        ));

        assert_eq!(view.connection_status, ConnectionStatus::PartialConnection);

        let api = find(&view, 101);
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].connection_status, ConnectionStatus::Connected);
        assert!(api[0].enabled);
        assert!(api[0].repository_id.is_some());

        let web = find(&view, 102);
        assert_eq!(web.len(), 1);
        assert_eq!(web[0].connection_status, ConnectionStatus::Connected);
        assert!(!web[0].enabled);
        assert!(web[0].repository_id.is_none());

        let stale = find(&view, 103);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].connection_status, ConnectionStatus::ConnectionFailure);

        let names: Vec<_> = view.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["api", "stale", "web"]);
        assert_eq!(
            view.installation_url.as_deref(),
            Some("https://github.com/organizations/acme/settings/installations/42")
        );
    }

    #[test]
    fn installed_org_with_no_repositories_is_connected() {
        let view = classify_organization(input(
            installed_github_org("empty", "p1", 7),
            ProviderListing::Listed(vec![]),
            vec![],
        ));
        assert_eq!(view.connection_status, ConnectionStatus::Connected);
        assert!(view.repositories.is_empty());
    }

    #[test]
    fn org_without_installation_is_no_connection() {
        let view = classify_organization(input(
            github_org("acme", "p1"),
            ProviderListing::NoInstallation,
            vec![local_repo("acme", 1, "one", true)],
        ));
        assert_eq!(view.connection_status, ConnectionStatus::NoConnection);
        assert_eq!(
            view.repositories[0].connection_status,
            ConnectionStatus::ConnectionFailure
        );
        assert_eq!(view.installation_url, None);
    }

    #[test]
    fn failed_listing_is_connection_failure_with_message() {
        let view = classify_organization(input(
            installed_github_org("acme", "p1", 1),
            ProviderListing::Failed("provider unavailable (HTTP 502)".into()),
            vec![local_repo("acme", 1, "one", true)],
        ));
        assert_eq!(view.connection_status, ConnectionStatus::ConnectionFailure);
        assert_eq!(
            view.connection_status_message.as_deref(),
            Some("provider unavailable (HTTP 502)")
        );
        assert_eq!(view.repositories.len(), 1);
    }

    #[test]
    fn locally_disabled_visible_repository_appears_once() {
        let view = classify_organization(input(
            installed_github_org("acme", "p1", 1),
            ProviderListing::Listed(vec![ProviderRepository::new(5, "five")]),
            vec![local_repo("acme", 5, "five", false)],
        ));
        let rows = find(&view, 5);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].connection_status, ConnectionStatus::Connected);
        assert!(!rows[0].enabled);
        assert!(rows[0].repository_id.is_some());
        assert_eq!(view.connection_status, ConnectionStatus::Connected);
    }

    #[test]
    fn local_key_match_ignores_org_name_case() {
        let view = classify_organization(input(
            installed_github_org("Acme", "p1", 1),
            ProviderListing::Listed(vec![ProviderRepository::new(5, "five")]),
            vec![local_repo("acme", 5, "five", true)],
        ));
        assert_eq!(view.connection_status, ConnectionStatus::Connected);
        assert_eq!(view.repositories.len(), 1);
    }

    #[test]
    fn organizations_sort_case_insensitively() {
        let view = build_view(
            ProjectSfid::from("p1"),
            ["beta", "Alpha", "gamma"]
                .into_iter()
                .map(|n| input(github_org(n, "p1"), ProviderListing::NoInstallation, vec![]))
                .collect(),
        );
        let names: Vec<_> = view
            .organizations
            .iter()
            .map(|o| o.organization_name.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha", "beta", "gamma"]);
    }

    #[test]
    fn repository_ties_break_on_external_id() {
        let view = classify_organization(input(
            installed_github_org("acme", "p1", 1),
            ProviderListing::Listed(vec![
                ProviderRepository::new(9, "Same"),
                ProviderRepository::new(3, "same"),
            ]),
            vec![],
        ));
        let ids: Vec<_> = view.repositories.iter().map(|r| r.external_id.0).collect();
        assert_eq!(ids, vec![3, 9]);
    }

    // ─── Properties ───

    proptest! {
        #[test]
        fn provider_repositories_appear_exactly_once(input in arb_organization_input()) {
            let visible: Vec<ExternalRepoId> = match &input.listing {
                ProviderListing::Listed(repos) => repos.iter().map(|r| r.external_id).collect(),
                _ => vec![],
            };
            let local_ids: HashSet<ExternalRepoId> =
                input.local.iter().map(|r| r.external_id).collect();
            let view = classify_organization(input);

            for id in visible {
                let rows: Vec<_> = view.repositories.iter().filter(|r| r.external_id == id).collect();
                prop_assert_eq!(rows.len(), 1);
                prop_assert_eq!(rows[0].connection_status, ConnectionStatus::Connected);
                if !local_ids.contains(&id) {
                    prop_assert!(!rows[0].enabled);
                    prop_assert!(rows[0].repository_id.is_none());
                }
            }
        }

        #[test]
        fn local_repositories_missing_from_listing_fail(input in arb_organization_input()) {
            let listed = matches!(input.listing, ProviderListing::Listed(_));
            let visible: HashSet<ExternalRepoId> = match &input.listing {
                ProviderListing::Listed(repos) => repos.iter().map(|r| r.external_id).collect(),
                _ => HashSet::new(),
            };
            let stale = input.local.iter().any(|r| !visible.contains(&r.external_id));
            let view = classify_organization(input);

            for row in view.repositories.iter().filter(|r| r.repository_id.is_some()) {
                if !visible.contains(&row.external_id) {
                    prop_assert_eq!(row.connection_status, ConnectionStatus::ConnectionFailure);
                }
            }
            if listed {
                let expected = if stale {
                    ConnectionStatus::PartialConnection
                } else {
                    ConnectionStatus::Connected
                };
                prop_assert_eq!(view.connection_status, expected);
            }
        }

        #[test]
        fn classification_is_idempotent_and_order_independent(input in arb_organization_input()) {
            let first = classify_organization(input.clone());
            let again = classify_organization(input.clone());
            prop_assert_eq!(&first, &again);

            let mut shuffled = input;
            shuffled.local.reverse();
            if let ProviderListing::Listed(repos) = &mut shuffled.listing {
                repos.reverse();
            }
            prop_assert_eq!(first, classify_organization(shuffled));
        }
    }
}
