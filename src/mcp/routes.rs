/// Which handler serves a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub tool: &'static str,
    pub handler: &'static str,
}

const fn route(tool: &'static str, handler: &'static str) -> Route {
    Route { tool, handler }
}

pub const ROUTES: &[Route] = &[
    route("contract_list", "account"),
    route("group_list", "account"),
    route("product_list", "account"),
    route("property_list", "property"),
    route("property_get", "property"),
    route("property_create", "property"),
    route("property_delete", "property"),
    route("property_version_create", "property"),
    route("property_rules_get", "property"),
    route("property_rules_update", "property"),
    route("property_hostnames_list", "property"),
    route("property_activate", "property"),
    route("property_activation_status", "property"),
    route("property_search", "property"),
    route("property_bulk_search", "property"),
    route("edge_hostname_list", "property"),
    route("edge_hostname_create", "property"),
    route("include_list", "property"),
    route("dns_zone_list", "dns"),
    route("dns_zone_get", "dns"),
    route("dns_zone_create", "dns"),
    route("dns_zone_activate", "dns"),
    route("dns_records_list", "dns"),
    route("dns_record_upsert", "dns"),
    route("dns_record_delete", "dns"),
    route("dns_records_bulk_import", "dns"),
    route("purge_urls", "purge"),
    route("purge_cpcodes", "purge"),
    route("purge_tags", "purge"),
    route("cps_enrollment_list", "cps"),
    route("cps_enrollment_get", "cps"),
    route("cps_dv_enrollment_create", "cps"),
    route("cps_enrollment_status", "cps"),
    route("reporting_traffic", "reporting"),
    route("network_list_list", "security"),
    route("network_list_get", "security"),
    route("network_list_create", "security"),
    route("network_list_add_elements", "security"),
    route("network_list_activate", "security"),
    route("appsec_config_list", "security"),
    route("siem_events_get", "security"),
    route("securemobi_tenant_list", "securemobi"),
    route("securemobi_tenant_get", "securemobi"),
    route("securemobi_tenant_create", "securemobi"),
];

pub fn route_for(tool: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|r| r.tool == tool)
}

pub fn routed_tool_names() -> Vec<&'static str> {
    ROUTES.iter().map(|r| r.tool).collect()
}

pub fn handler_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = ROUTES.iter().map(|r| r.handler).collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tool_names_are_unique() {
        let names: HashSet<&str> = ROUTES.iter().map(|r| r.tool).collect();
        assert_eq!(names.len(), ROUTES.len());
    }

    #[test]
    fn handlers_are_the_eight_domains() {
        assert_eq!(
            handler_names(),
            vec!["account", "cps", "dns", "property", "purge", "reporting", "securemobi", "security"]
        );
    }
}
