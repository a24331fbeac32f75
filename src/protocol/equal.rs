//! Secure equality test of two shared values.

use num_bigint::BigUint;
use tracing::{Level, instrument};

use super::{
    Context, Error, MisuseError, compare::check_bit_length, recover_vec, secure_product_many,
};
use crate::{channel::Channel, preprocessing::Supply};

/// Returns a share of `1` if `a == b` and of `0` otherwise.
///
/// Consumes one tuple and `L - 1` triples.
pub async fn equal<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    a: &BigUint,
    b: &BigUint,
) -> Result<BigUint, Error> {
    let mut eq = equal_vec(ctx, std::slice::from_ref(a), std::slice::from_ref(b)).await?;
    eq.pop().ok_or(Error::Misuse(MisuseError::EmptyInput))
}

/// Tests shared vectors for element-wise equality, returning shares of `a_i == b_i`.
///
/// Opens `c = a - b + r` for a fresh random `r` per element. `a == b` holds exactly when every bit
/// of `c` matches the corresponding shared bit of `r`, which is a product of `L` shared bits
/// computed by a single [`secure_product_many`] over all elements.
#[instrument(level = Level::DEBUG, skip_all, fields(party = %ctx.party, n = a.len()), err)]
pub async fn equal_vec<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    a: &[BigUint],
    b: &[BigUint],
) -> Result<Vec<BigUint>, Error> {
    if a.len() != b.len() {
        return Err(MisuseError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        }
        .into());
    }
    if a.is_empty() {
        return Ok(vec![]);
    }
    let tuples = ctx.supply.tuples(a.len())?;
    check_bit_length(ctx.field.bit_length(), &tuples)?;
    let field = &ctx.field;
    let masked: Vec<BigUint> = a
        .iter()
        .zip(b)
        .zip(&tuples)
        .map(|((a, b), t)| field.add(&field.sub(a, b), &t.r))
        .collect();

    let opened = recover_vec(ctx, &masked).await?;

    let field = &ctx.field;
    let party = ctx.party;
    // 1 exactly where the bit of c matches the bit of r
    let matches: Vec<Vec<BigUint>> = opened
        .iter()
        .zip(&tuples)
        .map(|(c, t)| {
            field
                .bits(c)
                .into_iter()
                .zip(&t.bits)
                .map(|(c_bit, r_bit)| {
                    if c_bit {
                        r_bit.clone()
                    } else {
                        field.one_minus(party, r_bit)
                    }
                })
                .collect()
        })
        .collect();

    secure_product_many(ctx, &matches).await
}
