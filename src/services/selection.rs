use serde_json::Value;
use std::sync::Arc;

/// A group chosen as default, together with the contract it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChoice {
    pub group_id: String,
    pub contract_id: Option<String>,
}

/// Chooses a default contract or group when a caller omits one. Inputs are
/// the `items` arrays of PAPI `/contracts` and `/groups` in listing order.
pub trait SelectionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn pick_contract(&self, contracts: &[Value]) -> Option<String>;

    /// `contract_id` narrows the candidates to groups attached to it.
    fn pick_group(&self, groups: &[Value], contract_id: Option<&str>) -> Option<GroupChoice>;
}

fn group_contracts(group: &Value) -> Vec<String> {
    group
        .get("contractIds")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn choice_for(group: &Value, contract_id: Option<&str>) -> Option<GroupChoice> {
    let group_id = group.get("groupId").and_then(|v| v.as_str())?.to_string();
    let contract_id = contract_id
        .map(|s| s.to_string())
        .or_else(|| group_contracts(group).into_iter().next());
    Some(GroupChoice {
        group_id,
        contract_id,
    })
}

fn candidates<'a>(groups: &'a [Value], contract_id: Option<&'a str>) -> impl Iterator<Item = &'a Value> {
    groups.iter().filter(move |group| match contract_id {
        Some(contract) => group_contracts(group).iter().any(|c| c == contract),
        None => true,
    })
}

/// First contract and first matching group in listing order.
pub struct FirstListed;

impl SelectionPolicy for FirstListed {
    fn name(&self) -> &'static str {
        "first"
    }

    fn pick_contract(&self, contracts: &[Value]) -> Option<String> {
        contracts
            .iter()
            .find_map(|c| c.get("contractId").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
    }

    fn pick_group(&self, groups: &[Value], contract_id: Option<&str>) -> Option<GroupChoice> {
        candidates(groups, contract_id).find_map(|g| choice_for(g, contract_id))
    }
}

/// Like [`FirstListed`] but prefers a group whose name contains "default",
/// then a top-level group (no parent).
pub struct PreferDefaultNamed;

impl SelectionPolicy for PreferDefaultNamed {
    fn name(&self) -> &'static str {
        "prefer-default"
    }

    fn pick_contract(&self, contracts: &[Value]) -> Option<String> {
        FirstListed.pick_contract(contracts)
    }

    fn pick_group(&self, groups: &[Value], contract_id: Option<&str>) -> Option<GroupChoice> {
        let named_default = candidates(groups, contract_id).find(|g| {
            g.get("groupName")
                .and_then(|v| v.as_str())
                .map(|n| n.to_lowercase().contains("default"))
                .unwrap_or(false)
        });
        let top_level = || {
            candidates(groups, contract_id).find(|g| {
                g.get("parentGroupId")
                    .map(|v| v.is_null())
                    .unwrap_or(true)
            })
        };
        named_default
            .or_else(top_level)
            .and_then(|g| choice_for(g, contract_id))
            .or_else(|| FirstListed.pick_group(groups, contract_id))
    }
}

pub fn policy_from_name(raw: &str) -> Arc<dyn SelectionPolicy> {
    match raw.trim().to_lowercase().as_str() {
        "prefer-default" | "prefer_default" | "default" => Arc::new(PreferDefaultNamed),
        _ => Arc::new(FirstListed),
    }
}
