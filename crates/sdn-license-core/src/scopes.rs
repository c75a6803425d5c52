//! Plans and the scopes they grant.

/// Free read access to the data API.
pub const SCOPE_READ_FREE: &str = "read:free";
/// Base plugin access; the default required scope of a plugin.
pub const SCOPE_BASE: &str = "base";
/// Premium read access to the data API.
pub const SCOPE_READ_PREMIUM: &str = "read:premium";
/// Premium plugin access.
pub const SCOPE_PREMIUM: &str = "premium";

pub const PLAN_FREE: &str = "free";

/// Plans an administrator may assign.
pub const KNOWN_PLANS: &[&str] = &["free", "starter", "pro", "enterprise"];

/// Scopes granted by `plan`.
///
/// Every plan gets the base set; anything other than `free` (or no plan)
/// also gets the premium scopes.
pub fn scopes_for_plan(plan: &str) -> Vec<String> {
    let mut scopes = vec![SCOPE_READ_FREE.to_string(), SCOPE_BASE.to_string()];
    let normalized = plan.trim().to_ascii_lowercase();
    if !(normalized.is_empty() || normalized == PLAN_FREE) {
        scopes.push(SCOPE_READ_PREMIUM.to_string());
        scopes.push(SCOPE_PREMIUM.to_string());
    }
    scopes
}

pub fn is_known_plan(plan: &str) -> bool {
    KNOWN_PLANS.contains(&plan)
}
