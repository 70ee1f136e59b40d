//! Console navigation and the claim requirements that gate it

use serde::Serialize;

use crate::auth::AuthClaims;

/// A claim that must hold one of the listed values
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequiredClaim {
    pub claim_key: &'static str,
    pub claim_values: &'static [&'static str],
}

impl RequiredClaim {
    pub fn is_satisfied_by(&self, claims: &AuthClaims) -> bool {
        claims
            .get_str(self.claim_key)
            .is_some_and(|value| self.claim_values.contains(&value))
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct NavLink {
    pub title: &'static str,
    pub path: &'static str,
    pub required_claims: &'static [RequiredClaim],
}

impl NavLink {
    /// Links without requirements are always visible. Links with requirements are
    /// hidden until claims are known, and then need every requirement satisfied.
    pub fn is_visible(&self, claims: Option<&AuthClaims>) -> bool {
        if self.required_claims.is_empty() {
            return true;
        }

        match claims {
            None => false,
            Some(claims) => self
                .required_claims
                .iter()
                .all(|required| required.is_satisfied_by(claims)),
        }
    }
}

const COMMITTEE_MANAGER: &[RequiredClaim] = &[
    RequiredClaim {
        claim_key: "dbRole",
        claim_values: &["committee"],
    },
    RequiredClaim {
        claim_key: "committeeRank",
        claim_values: &["coordinator", "chair"],
    },
];

pub const NAV_LINKS: &[NavLink] = &[
    NavLink {
        title: "Home",
        path: "/",
        required_claims: &[],
    },
    NavLink {
        title: "Marathon Manager",
        path: "/marathon-console",
        required_claims: COMMITTEE_MANAGER,
    },
    NavLink {
        title: "Spirit Point Manager",
        path: "/spirit-console",
        required_claims: COMMITTEE_MANAGER,
    },
    NavLink {
        title: "Morale Point Manager",
        path: "/morale-console",
        required_claims: COMMITTEE_MANAGER,
    },
    NavLink {
        title: "Notification Manager",
        path: "/notification-console",
        required_claims: COMMITTEE_MANAGER,
    },
    NavLink {
        title: "Event Manager",
        path: "/event-console",
        required_claims: COMMITTEE_MANAGER,
    },
];

pub const EVENT_CONSOLE_PATH: &str = "/event-console";

/// The links visible under `claims`, in their configured order.
pub fn visible_links<'a>(links: &'a [NavLink], claims: Option<&AuthClaims>) -> Vec<&'a NavLink> {
    links.iter().filter(|link| link.is_visible(claims)).collect()
}

/// Whether `claims` may open the console page at `path`.
///
/// A page is reachable when the nav link that owns it is visible; unknown paths are not.
pub fn route_permits(path: &str, claims: Option<&AuthClaims>) -> bool {
    NAV_LINKS
        .iter()
        .find(|link| link.path == path)
        .is_some_and(|link| link.is_visible(claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(entries: &[(&str, serde_json::Value)]) -> AuthClaims {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn chair() -> AuthClaims {
        claims(&[
            ("dbRole", json!("committee")),
            ("committeeRank", json!("chair")),
        ])
    }

    fn titles(links: Vec<&NavLink>) -> Vec<&'static str> {
        links.into_iter().map(|l| l.title).collect()
    }

    #[test]
    fn public_links_are_always_visible() {
        let home = &NAV_LINKS[0];

        assert!(home.is_visible(None));
        assert!(home.is_visible(Some(&AuthClaims::default())));
        assert!(home.is_visible(Some(&chair())));
    }

    #[test]
    fn unresolved_claims_hide_gated_links() {
        assert_eq!(titles(visible_links(NAV_LINKS, None)), vec!["Home"]);
        assert_eq!(
            titles(visible_links(NAV_LINKS, Some(&AuthClaims::default()))),
            vec!["Home"]
        );
    }

    #[test]
    fn every_requirement_must_hold() {
        let member = claims(&[
            ("dbRole", json!("committee")),
            ("committeeRank", json!("member")),
        ]);
        let rank_only = claims(&[("committeeRank", json!("coordinator"))]);
        let non_string = claims(&[
            ("dbRole", json!(["committee"])),
            ("committeeRank", json!("chair")),
        ]);

        assert!(!NAV_LINKS[1].is_visible(Some(&member)));
        assert!(!NAV_LINKS[1].is_visible(Some(&rank_only)));
        assert!(!NAV_LINKS[1].is_visible(Some(&non_string)));
        assert!(NAV_LINKS[1].is_visible(Some(&chair())));
    }

    #[test]
    fn filtering_keeps_configured_order() {
        let links = [
            NavLink {
                title: "Gated",
                path: "/a",
                required_claims: &[RequiredClaim {
                    claim_key: "dbRole",
                    claim_values: &["committee"],
                }],
            },
            NavLink {
                title: "Open",
                path: "/b",
                required_claims: &[],
            },
            NavLink {
                title: "Other",
                path: "/c",
                required_claims: &[RequiredClaim {
                    claim_key: "dbRole",
                    claim_values: &["team-captain"],
                }],
            },
        ];

        assert_eq!(
            titles(visible_links(&links, Some(&chair()))),
            vec!["Gated", "Open"]
        );
        assert_eq!(
            titles(visible_links(NAV_LINKS, Some(&chair()))),
            NAV_LINKS.iter().map(|l| l.title).collect::<Vec<_>>()
        );
    }

    #[test]
    fn routes_follow_their_nav_links() {
        assert!(route_permits("/", None));
        assert!(!route_permits(EVENT_CONSOLE_PATH, None));
        assert!(route_permits(EVENT_CONSOLE_PATH, Some(&chair())));
        assert!(!route_permits("/unknown", Some(&chair())));
    }
}
