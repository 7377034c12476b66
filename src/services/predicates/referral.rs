//! Referral code binding predicate

use async_trait::async_trait;

use super::{CheckContext, Grant, Predicate, PredicateError};

/// Bind a referral code to the account
pub struct ReferralBind;

#[async_trait]
impl Predicate for ReferralBind {
    async fn verify(&self, ctx: &CheckContext<'_>) -> Result<Vec<Grant>, PredicateError> {
        let user = ctx.sources.users.get_user(ctx.user).await?;

        match user.as_ref().and_then(|u| u.bound_code()) {
            Some(code) => Ok(vec![Grant::whole(ctx.mission, code)]),
            None => Err(PredicateError::Unmet("no referral code bound".into())),
        }
    }
}
