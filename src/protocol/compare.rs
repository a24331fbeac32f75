//! Secure comparison of two shared values `0 <= a, b < p/2`.
//!
//! The sign of `c = a - b` is read off the least significant bit of `2c mod p`: it is 0 exactly
//! when `c < p/2`, i.e. when no wrap-around happened. That bit is computed under a random mask
//! `r`, opening `c' = 2c + r` and correcting for the wrap-around of the masking, which is itself
//! detected by a bitwise comparison of the public `c'` with the shared bits of `r`.

use num_bigint::BigUint;
use tracing::{Level, instrument};

use super::{Context, Error, MisuseError, multiply_vec, recover_vec};
use crate::{channel::Channel, data_types::RandomNumberTuple, preprocessing::Supply};

/// Returns a share of `1` if `a < b` and of `0` otherwise.
///
/// Consumes one tuple and `2L` triples, see
/// [`triples_for_comparison`](crate::preprocessing::triples_for_comparison).
pub async fn less_than<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    a: &BigUint,
    b: &BigUint,
) -> Result<BigUint, Error> {
    let mut lt = less_than_vec(ctx, std::slice::from_ref(a), std::slice::from_ref(b)).await?;
    lt.pop().ok_or(Error::Misuse(MisuseError::EmptyInput))
}

/// Compares shared vectors element-wise, returning shares of `a_i < b_i`.
///
/// Every round is batched across all elements, so the number of rounds is `L + 2` regardless of
/// the length of the vectors.
#[instrument(level = Level::DEBUG, skip_all, fields(party = %ctx.party, n = a.len()), err)]
pub async fn less_than_vec<C: Channel, S: Supply>(
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
    let diff: Vec<BigUint> = a.iter().zip(b).map(|(a, b)| ctx.field.sub(a, b)).collect();
    let below_half = below_half_vec(ctx, &diff).await?;
    // a < b exactly when a - b wrapped around, i.e. is not below p/2
    Ok(below_half
        .iter()
        .map(|t| ctx.field.one_minus(ctx.party, t))
        .collect())
}

/// Returns shares of `c_i < p/2` for shared `c_i`.
async fn below_half_vec<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    c: &[BigUint],
) -> Result<Vec<BigUint>, Error> {
    let tuples = ctx.supply.tuples(c.len())?;
    check_bit_length(ctx.field.bit_length(), &tuples)?;
    let field = &ctx.field;
    let two = BigUint::from(2u32);
    let masked: Vec<BigUint> = c
        .iter()
        .zip(&tuples)
        .map(|(c, t)| field.add(&field.scale(&two, c), &t.r))
        .collect();

    let opened = recover_vec(ctx, &masked).await?;

    let field = &ctx.field;
    let party = ctx.party;
    // alpha = c'_0 XOR r_0
    let alpha: Vec<BigUint> = opened
        .iter()
        .zip(&tuples)
        .map(|(opened, t)| {
            if field.bits(opened)[0] {
                field.one_minus(party, &t.bits[0])
            } else {
                t.bits[0].clone()
            }
        })
        .collect();
    let r_bits: Vec<&[BigUint]> = tuples.iter().map(|t| t.bits.as_slice()).collect();
    // beta = c' < r, i.e. whether masking wrapped around p
    let beta = public_less_than_vec(ctx, &opened, &r_bits).await?;

    let alpha_beta = multiply_vec(ctx, &alpha, &beta).await?;
    let field = &ctx.field;
    Ok(alpha
        .iter()
        .zip(&beta)
        .zip(&alpha_beta)
        .map(|((alpha, beta), alpha_beta)| {
            // the LSB of 2c is alpha XOR beta = alpha + beta - 2 alpha beta
            let lsb = field.sub(&field.add(alpha, beta), &field.scale(&two, alpha_beta));
            field.one_minus(party, &lsb)
        })
        .collect())
}

/// Returns shares of `public_j < secret_j`, where `secret_j` is given by shares of its `L` bits.
///
/// The suffix-OR chain `d_i` over the differing bits needs `L - 1` sequential rounds, after
/// which `e_i = d_i - d_{i+1}` marks the most significant differing bit and a final round selects
/// the secret bit at that position.
async fn public_less_than_vec<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    public: &[BigUint],
    secret_bits: &[&[BigUint]],
) -> Result<Vec<BigUint>, Error> {
    let l = ctx.field.bit_length();
    let n = public.len();
    let field = &ctx.field;
    let party = ctx.party;

    // t_i = public_i XOR secret_i
    let differs: Vec<Vec<BigUint>> = public
        .iter()
        .zip(secret_bits)
        .map(|(public, secret)| {
            field
                .bits(public)
                .into_iter()
                .zip(secret.iter())
                .map(|(public_bit, secret_bit)| {
                    if public_bit {
                        field.one_minus(party, secret_bit)
                    } else {
                        secret_bit.clone()
                    }
                })
                .collect()
        })
        .collect();

    let mut or_suffix: Vec<Vec<BigUint>> = differs.clone();
    let mut first_diff: Vec<Vec<BigUint>> = differs.clone();
    for i in (0..l - 1).rev() {
        let higher: Vec<BigUint> = or_suffix.iter().map(|d| d[i + 1].clone()).collect();
        let current: Vec<BigUint> = differs.iter().map(|t| t[i].clone()).collect();
        let both = multiply_vec(ctx, &higher, &current).await?;
        let field = &ctx.field;
        for j in 0..n {
            let d = field.sub(&field.add(&higher[j], &current[j]), &both[j]);
            first_diff[j][i] = field.sub(&d, &higher[j]);
            or_suffix[j][i] = d;
        }
    }

    let selectors: Vec<BigUint> = first_diff.into_iter().flatten().collect();
    let bits: Vec<BigUint> = secret_bits
        .iter()
        .flat_map(|bits| bits.iter().cloned())
        .collect();
    let selected = multiply_vec(ctx, &selectors, &bits).await?;
    let field = &ctx.field;
    Ok(selected
        .chunks(l)
        .map(|chunk| {
            chunk
                .iter()
                .fold(BigUint::default(), |sum, x| field.add(&sum, x))
        })
        .collect())
}

pub(super) fn check_bit_length(expected: usize, tuples: &[RandomNumberTuple]) -> Result<(), Error> {
    match tuples.iter().find(|t| t.bit_length() != expected) {
        Some(t) => Err(MisuseError::TupleBitLength {
            expected,
            actual: t.bit_length(),
        }
        .into()),
        None => Ok(()),
    }
}
