use crate::api::Data;
use crate::auth::MaybeAuth;
use crate::domain::nav::{visible_links, NavLink, NAV_LINKS};

/// Navigation entries the caller may see; anonymous callers get the public ones
pub async fn get_nav(MaybeAuth(auth): MaybeAuth) -> Data<Vec<&'static NavLink>> {
    let claims = auth.as_ref().and_then(|a| a.claims.as_ref());
    Data::new(visible_links(NAV_LINKS, claims))
}
