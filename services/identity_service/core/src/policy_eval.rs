//! The pure policy-rule evaluator (C5): `(principal, action, resource,
//! context) → allow | deny`, no I/O. Grounded on
//! `original_source/manushya/core/policy_engine.py`'s `check_permission` /
//! `_evaluate_policy` / `_evaluate_conditions` family, with the ordering
//! and default-deny behavior pinned down exactly as spec §4.5 states it
//! (the original sorts candidates by priority only; this evaluator adds
//! the `created_at` ascending tie-break the spec requires for
//! determinism).

use crate::model::{Effect, IpRestrictions, Policy, PolicyConditions, ResourceConditions, TimeRestrictions};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::Value;
use shared_types::Principal;
use std::net::IpAddr;
use std::str::FromStr;

/// Extra facts a condition may need that aren't on the `Principal` itself:
/// the caller's IP and whatever the resource being acted on supplies.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub client_ip: Option<String>,
    pub resource_memory_type: Option<String>,
    pub resource_metadata: serde_json::Map<String, Value>,
}

/// Evaluate `(principal, action, resource, context)` against an
/// already-fetched, `is_active = true` policy set for the principal's
/// `(tenant, role)`. `policies` need not be pre-sorted; this function
/// applies the priority-desc/created_at-asc ordering itself (§4.5 step 2).
///
/// Returns the effect of the first matching policy, defaulting to `deny`
/// when nothing matches (P2). A policy whose `conditions` can't be
/// evaluated (malformed shape) is treated as non-matching, never as an
/// error — per §7's `PolicyMalformed` row, which is write-time only.
pub fn evaluate(
    policies: &[Policy],
    principal: &Principal,
    action: &str,
    resource: &str,
    ctx: &EvalContext,
    now: DateTime<Utc>,
) -> Effect {
    let mut ordered: Vec<&Policy> = policies.iter().filter(|p| p.is_active).collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

    for policy in ordered {
        if policy_matches(policy, principal, action, resource, ctx, now) {
            return policy.rule.0.effect;
        }
    }
    Effect::Deny
}

fn policy_matches(
    policy: &Policy,
    principal: &Principal,
    action: &str,
    resource: &str,
    ctx: &EvalContext,
    now: DateTime<Utc>,
) -> bool {
    let rule = &policy.rule.0;

    let action_matches = rule.actions.iter().any(|a| a == "*") || rule.actions.iter().any(|a| a == action);
    if !action_matches {
        return false;
    }

    if rule.resource != "*" && rule.resource != resource {
        return false;
    }

    match &rule.conditions {
        Some(conditions) => conditions_hold(conditions, principal, ctx, now),
        None => true,
    }
}

fn conditions_hold(conditions: &PolicyConditions, principal: &Principal, ctx: &EvalContext, now: DateTime<Utc>) -> bool {
    if let Some(roles) = &conditions.roles {
        if !roles.iter().any(|r| r == &principal.role) {
            return false;
        }
    }

    if let Some(claims) = &conditions.identity_claims {
        if !identity_claims_match(claims, &principal.claims) {
            return false;
        }
    }

    if let Some(time_restrictions) = &conditions.time_restrictions {
        if !time_restrictions_hold(time_restrictions, now) {
            return false;
        }
    }

    if let Some(ip_restrictions) = &conditions.ip_restrictions {
        // `original_source/manushya/core/policy_engine.py`'s
        // `_evaluate_conditions` only runs the IP check `if client_ip and
        // not ...` — an absent client_ip skips the restriction entirely
        // rather than failing it. Reproduced as-is (§9: match the original
        // on spec-silent behavior rather than fail closed).
        if let Some(ip) = &ctx.client_ip {
            if !ip_restrictions_hold(ip_restrictions, ip) {
                return false;
            }
        }
    }

    if let Some(resource_conditions) = &conditions.resource_conditions {
        if !resource_conditions_hold(resource_conditions, ctx) {
            return false;
        }
    }

    true
}

/// Deep-equal per `(k,v)`: `principal.claims[k] == v` (§4.5).
fn identity_claims_match(required: &serde_json::Map<String, Value>, claims: &Value) -> bool {
    for (key, expected) in required {
        match claims.get(key) {
            Some(actual) if actual == expected => continue,
            _ => return false,
        }
    }
    true
}

fn time_restrictions_hold(restrictions: &TimeRestrictions, now: DateTime<Utc>) -> bool {
    if let Some(hours) = &restrictions.time_of_day {
        if !hours.contains(&now.hour()) {
            return false;
        }
    }

    if let Some(days) = &restrictions.days_of_week {
        // Monday = 0, matching `datetime.weekday()` in the original.
        let weekday = now.weekday().num_days_from_monday();
        if !days.contains(&weekday) {
            return false;
        }
    }

    if let Some(range) = &restrictions.date_range {
        if !(range.start <= now && now <= range.end) {
            return false;
        }
    }

    true
}

fn ip_restrictions_hold(restrictions: &IpRestrictions, client_ip: &str) -> bool {
    if let Some(allowed) = &restrictions.allowed_ips {
        if allowed.iter().any(|ip| ip == client_ip) {
            return true;
        }
    }

    let Ok(client_ip) = IpAddr::from_str(client_ip) else {
        return false;
    };

    if let Some(ranges) = &restrictions.allowed_ranges {
        for cidr in ranges {
            if ip_in_cidr(client_ip, cidr) {
                return true;
            }
        }
    }

    false
}

fn ip_in_cidr(ip: IpAddr, cidr: &str) -> bool {
    let Some((network, prefix)) = cidr.split_once('/') else { return false };
    let Ok(network) = IpAddr::from_str(network) else { return false };
    let Ok(prefix) = prefix.parse::<u32>() else { return false };

    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            if prefix > 32 {
                return false;
            }
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
            (u32::from(ip) & mask) == (u32::from(net) & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            if prefix > 128 {
                return false;
            }
            let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
            (u128::from(ip) & mask) == (u128::from(net) & mask)
        }
        _ => false,
    }
}

/// Missing context keys fail the condition (§4.5: "context must supply
/// the referenced keys; missing → fail").
fn resource_conditions_hold(conditions: &ResourceConditions, ctx: &EvalContext) -> bool {
    if let Some(types) = &conditions.memory_types {
        match &ctx.resource_memory_type {
            Some(t) if types.iter().any(|ty| ty == t) => {}
            _ => return false,
        }
    }

    if let Some(requirements) = &conditions.metadata_requirements {
        for (key, expected) in requirements {
            match ctx.resource_metadata.get(key) {
                Some(actual) if actual == expected => continue,
                _ => return false,
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PolicyRule;
    use shared_types::Scope;
    use uuid::Uuid;

    fn principal(role: &str, claims: Value) -> Principal {
        Principal { identity_id: Uuid::new_v4(), scope: Scope::Tenant(Uuid::new_v4()), role: role.to_string(), claims }
    }

    fn policy(priority: i32, created_at: DateTime<Utc>, rule: PolicyRule) -> Policy {
        Policy {
            id: Uuid::new_v4(),
            tenant_id: Some(Uuid::new_v4()),
            role: "user".to_string(),
            rule: sqlx::types::Json(rule),
            description: None,
            priority,
            is_active: true,
            created_at,
            updated_at: created_at,
        }
    }

    fn allow_rule(actions: &[&str], resource: &str) -> PolicyRule {
        PolicyRule {
            actions: actions.iter().map(|s| s.to_string()).collect(),
            resource: resource.to_string(),
            effect: Effect::Allow,
            conditions: None,
        }
    }

    #[test]
    fn default_deny_with_no_policies() {
        let p = principal("user", Value::Null);
        let effect = evaluate(&[], &p, "read", "memory", &EvalContext::default(), Utc::now());
        assert_eq!(effect, Effect::Deny);
    }

    #[test]
    fn default_deny_when_nothing_matches() {
        let p = principal("user", Value::Null);
        let policies = vec![policy(0, Utc::now(), allow_rule(&["write"], "memory"))];
        let effect = evaluate(&policies, &p, "read", "memory", &EvalContext::default(), Utc::now());
        assert_eq!(effect, Effect::Deny);
    }

    #[test]
    fn wildcard_action_and_resource_match() {
        let p = principal("user", Value::Null);
        let policies = vec![policy(0, Utc::now(), allow_rule(&["*"], "*"))];
        let effect = evaluate(&policies, &p, "delete", "policy", &EvalContext::default(), Utc::now());
        assert_eq!(effect, Effect::Allow);
    }

    #[test]
    fn higher_priority_wins_regardless_of_order() {
        let p = principal("user", Value::Null);
        let now = Utc::now();
        let deny = Policy {
            rule: sqlx::types::Json(PolicyRule {
                actions: vec!["write".into()],
                resource: "memory".into(),
                effect: Effect::Deny,
                conditions: None,
            }),
            ..policy(0, now, allow_rule(&["write"], "memory"))
        };
        let allow = policy(10, now, allow_rule(&["write"], "memory"));

        // Order in the slice shouldn't matter; priority 10 beats 0.
        let effect = evaluate(&[deny.clone(), allow.clone()], &p, "write", "memory", &EvalContext::default(), now);
        assert_eq!(effect, Effect::Allow);
        let effect = evaluate(&[allow, deny], &p, "write", "memory", &EvalContext::default(), now);
        assert_eq!(effect, Effect::Allow);
    }

    #[test]
    fn priority_tie_broken_by_older_created_at_first() {
        let p = principal("user", Value::Null);
        let older = Utc::now() - chrono::Duration::hours(1);
        let newer = Utc::now();

        let older_deny = Policy {
            rule: sqlx::types::Json(PolicyRule {
                actions: vec!["write".into()],
                resource: "memory".into(),
                effect: Effect::Deny,
                conditions: None,
            }),
            ..policy(5, older, allow_rule(&["write"], "memory"))
        };
        let newer_allow = policy(5, newer, allow_rule(&["write"], "memory"));

        let effect = evaluate(&[newer_allow, older_deny], &p, "write", "memory", &EvalContext::default(), newer);
        assert_eq!(effect, Effect::Deny, "the older policy at the same priority should win");
    }

    #[test]
    fn roles_condition_restricts_match() {
        let p = principal("user", Value::Null);
        let mut rule = allow_rule(&["read"], "memory");
        rule.conditions = Some(PolicyConditions {
            roles: Some(vec!["admin".to_string()]),
            identity_claims: None,
            time_restrictions: None,
            ip_restrictions: None,
            resource_conditions: None,
        });
        let policies = vec![policy(0, Utc::now(), rule)];
        let effect = evaluate(&policies, &p, "read", "memory", &EvalContext::default(), Utc::now());
        assert_eq!(effect, Effect::Deny);
    }

    #[test]
    fn identity_claims_condition_deep_equal() {
        let p = principal("user", serde_json::json!({"team": "infra"}));
        let mut rule = allow_rule(&["read"], "memory");
        rule.conditions = Some(PolicyConditions {
            roles: None,
            identity_claims: Some(serde_json::json!({"team": "infra"}).as_object().unwrap().clone()),
            time_restrictions: None,
            ip_restrictions: None,
            resource_conditions: None,
        });
        let policies = vec![policy(0, Utc::now(), rule)];
        let effect = evaluate(&policies, &p, "read", "memory", &EvalContext::default(), Utc::now());
        assert_eq!(effect, Effect::Allow);
    }

    #[test]
    fn ip_restrictions_literal_and_cidr() {
        let p = principal("user", Value::Null);
        let mut rule = allow_rule(&["read"], "memory");
        rule.conditions = Some(PolicyConditions {
            roles: None,
            identity_claims: None,
            time_restrictions: None,
            ip_restrictions: Some(IpRestrictions {
                allowed_ips: Some(vec!["10.0.0.5".to_string()]),
                allowed_ranges: Some(vec!["192.168.1.0/24".to_string()]),
            }),
            resource_conditions: None,
        });
        let policies = vec![policy(0, Utc::now(), rule)];

        let mut ctx = EvalContext { client_ip: Some("192.168.1.42".to_string()), ..Default::default() };
        assert_eq!(evaluate(&policies, &p, "read", "memory", &ctx, Utc::now()), Effect::Allow);

        ctx.client_ip = Some("8.8.8.8".to_string());
        assert_eq!(evaluate(&policies, &p, "read", "memory", &ctx, Utc::now()), Effect::Deny);
    }

    #[test]
    fn ip_restrictions_skip_when_client_ip_absent() {
        // Matches the original's `if client_ip and not ...`: no client_ip
        // in context means the restriction is not evaluated at all, not
        // that it fails.
        let p = principal("user", Value::Null);
        let mut rule = allow_rule(&["read"], "memory");
        rule.conditions = Some(PolicyConditions {
            roles: None,
            identity_claims: None,
            time_restrictions: None,
            ip_restrictions: Some(IpRestrictions { allowed_ips: Some(vec!["10.0.0.5".to_string()]), allowed_ranges: None }),
            resource_conditions: None,
        });
        let policies = vec![policy(0, Utc::now(), rule)];
        let effect = evaluate(&policies, &p, "read", "memory", &EvalContext::default(), Utc::now());
        assert_eq!(effect, Effect::Allow);
    }

    #[test]
    fn resource_conditions_missing_context_key_fails_closed() {
        let p = principal("user", Value::Null);
        let mut rule = allow_rule(&["read"], "memory");
        rule.conditions = Some(PolicyConditions {
            roles: None,
            identity_claims: None,
            time_restrictions: None,
            ip_restrictions: None,
            resource_conditions: Some(ResourceConditions {
                memory_types: Some(vec!["note".to_string()]),
                metadata_requirements: None,
            }),
        });
        let policies = vec![policy(0, Utc::now(), rule)];

        let effect = evaluate(&policies, &p, "read", "memory", &EvalContext::default(), Utc::now());
        assert_eq!(effect, Effect::Deny);

        let ctx = EvalContext { resource_memory_type: Some("note".to_string()), ..Default::default() };
        assert_eq!(evaluate(&policies, &p, "read", "memory", &ctx, Utc::now()), Effect::Allow);
    }

    #[test]
    fn inactive_policies_are_ignored() {
        let p = principal("user", Value::Null);
        let mut pol = policy(100, Utc::now(), allow_rule(&["read"], "memory"));
        pol.is_active = false;
        let effect = evaluate(&[pol], &p, "read", "memory", &EvalContext::default(), Utc::now());
        assert_eq!(effect, Effect::Deny);
    }
}
