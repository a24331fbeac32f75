use duoshare::{
    data_types::PartyId,
    dealer::Dealer,
    field::Field,
    preprocessing::{ReusePolicy, triples_for_comparison, triples_for_equality, triples_for_product},
    protocol::{
        Error, MisuseError, equal, equal_vec, less_than, less_than_vec, multiply, recover,
        recover_vec, secure_product, secure_product_many, simulate,
    },
};
use num_bigint::BigUint;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

const L: usize = 16;

fn field() -> Field {
    Field::new(BigUint::from(65521u32), L).unwrap()
}

fn init_tracing() -> DefaultGuard {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .set_default()
}

/// Splits every value and returns the shares of C1 and C2.
fn share(dealer: &mut Dealer, values: &[u32]) -> [Vec<BigUint>; 2] {
    let (s1, s2): (Vec<_>, Vec<_>) = values
        .iter()
        .map(|&x| dealer.split(&BigUint::from(x)))
        .unzip();
    [s1, s2]
}

fn open(f: &Field, shares: &(Vec<BigUint>, Vec<BigUint>)) -> Vec<BigUint> {
    shares.0.iter().zip(&shares.1).map(|(x, y)| f.add(x, y)).collect()
}

#[tokio::test]
async fn add_then_recover() -> Result<(), Error> {
    let _g = init_tracing();
    let f = field();
    let mut dealer = Dealer::seeded(f.clone(), 1);
    let shares = share(&mut dealer, &[20, 22, 65000]);
    let shares = &shares;
    let (out1, out2) = simulate(&f, Default::default(), move |mut ctx| async move {
        let mine = &shares[ctx.party() as usize];
        let f = ctx.field().clone();
        let sum = f.add(&mine[0], &mine[1]);
        let diff = f.sub(&mine[0], &mine[1]);
        let scaled = f.scale(&BigUint::from(3u32), &mine[2]);
        recover_vec(&mut ctx, &[sum, diff, scaled]).await
    })
    .await?;
    assert_eq!(out1, out2);
    assert_eq!(out1[0], BigUint::from(42u32));
    assert_eq!(out1[1], BigUint::from(65521u32 - 2));
    assert_eq!(out1[2], BigUint::from(3 * 65000u32 % 65521));
    Ok(())
}

#[tokio::test]
async fn public_constants() -> Result<(), Error> {
    let f = field();
    let mut dealer = Dealer::seeded(f.clone(), 2);
    let shares = share(&mut dealer, &[100]);
    let shares = &shares;
    let (out, _) = simulate(&f, Default::default(), move |mut ctx| async move {
        let k = ctx.field().share_constant(ctx.party(), &BigUint::from(23u32));
        if ctx.party() == PartyId::C2 {
            assert_eq!(k, BigUint::default());
        }
        let x = ctx.field().add(&shares[ctx.party() as usize][0], &k);
        recover(&mut ctx, &x).await
    })
    .await?;
    assert_eq!(out, BigUint::from(123u32));
    Ok(())
}

#[tokio::test]
async fn multiply_two_values() -> Result<(), Error> {
    let f = field();
    let mut dealer = Dealer::seeded(f.clone(), 3);
    let shares = share(&mut dealer, &[6, 7]);
    let supplies = dealer.deal(1, 0, ReusePolicy::SingleUse);
    let shares = &shares;
    let (z1, z2) = simulate(&f, supplies, move |mut ctx| async move {
        let mine = &shares[ctx.party() as usize];
        multiply(&mut ctx, &mine[0], &mine[1]).await
    })
    .await?;
    assert_eq!(f.add(&z1, &z2), BigUint::from(42u32));
    Ok(())
}

fn element() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), Just(65520u32), 0..65521u32]
}

fn policy() -> impl Strategy<Value = ReusePolicy> {
    prop_oneof![Just(ReusePolicy::SingleUse), Just(ReusePolicy::Reuse)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn add_and_multiply_reconstruct(
        x in element(),
        y in element(),
        policy in policy(),
        seed in any::<u64>(),
    ) {
        let f = field();
        let mut dealer = Dealer::seeded(f.clone(), seed);
        let shares = share(&mut dealer, &[x, y]);
        let supplies = dealer.deal(1, 0, policy);
        let shares = &shares;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (out1, out2) = rt
            .block_on(simulate(&f, supplies, move |mut ctx| async move {
                let mine = &shares[ctx.party() as usize];
                let sum = ctx.field().add(&mine[0], &mine[1]);
                let product = multiply(&mut ctx, &mine[0], &mine[1]).await?;
                recover_vec(&mut ctx, &[sum, product]).await
            }))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(&out1, &out2);
        let (x, y) = (u64::from(x), u64::from(y));
        prop_assert_eq!(&out1[0], &BigUint::from((x + y) % 65521));
        prop_assert_eq!(&out1[1], &BigUint::from(x * y % 65521));
    }
}

#[tokio::test]
async fn products_of_various_lengths() -> Result<(), Error> {
    let _g = init_tracing();
    let f = field();
    for n in [1usize, 2, 3, 5, 8] {
        let mut dealer = Dealer::seeded(f.clone(), n as u64);
        let values: Vec<u32> = (0..n as u32).map(|i| 1000 + 17 * i).collect();
        let expected = values
            .iter()
            .fold(BigUint::from(1u32), |acc, &x| f.reduce(&(acc * x)));
        let shares = share(&mut dealer, &values);
        let supplies = dealer.deal(triples_for_product(n), 0, ReusePolicy::SingleUse);
        let shares = &shares;
        let (p1, p2) = simulate(&f, supplies, move |mut ctx| async move {
            let mine = &shares[ctx.party() as usize];
            let product = secure_product(&mut ctx, mine).await?;
            assert_eq!(ctx.supply().remaining_triples(), 0);
            Ok(product)
        })
        .await?;
        assert_eq!(f.add(&p1, &p2), expected, "product of {n} values");
    }
    Ok(())
}

#[tokio::test]
async fn products_of_several_arrays() -> Result<(), Error> {
    let f = field();
    let mut dealer = Dealer::seeded(f.clone(), 4);
    let arrays = [[2u32, 3, 5, 7, 11], [1, 0, 9, 9, 9], [4, 4, 4, 4, 4]];
    let expected: Vec<BigUint> = arrays
        .iter()
        .map(|a| BigUint::from(a.iter().product::<u32>()))
        .collect();
    let shares: Vec<[Vec<BigUint>; 2]> = arrays.iter().map(|a| share(&mut dealer, a)).collect();
    let supplies = dealer.deal(3 * triples_for_product(5), 0, ReusePolicy::SingleUse);
    let shares = &shares;
    let products = simulate(&f, supplies, move |mut ctx| async move {
        let mine: Vec<Vec<BigUint>> = shares
            .iter()
            .map(|s| s[ctx.party() as usize].clone())
            .collect();
        secure_product_many(&mut ctx, &mine).await
    })
    .await?;
    assert_eq!(open(&f, &products), expected);
    Ok(())
}

#[tokio::test]
async fn compare_fixed_cases() -> Result<(), Error> {
    let _g = init_tracing();
    let f = field();
    let max = 32760;
    let cases = [(5, 9, 1u32), (9, 5, 0), (7, 7, 0), (0, max, 1), (max, 0, 0), (max, max, 0)];
    for (i, &(a, b, expected)) in cases.iter().enumerate() {
        let mut dealer = Dealer::seeded(f.clone(), 100 + i as u64);
        let shares = share(&mut dealer, &[a, b]);
        let supplies = dealer.deal(triples_for_comparison(L), 1, ReusePolicy::SingleUse);
        let shares = &shares;
        let (lt1, lt2) = simulate(&f, supplies, move |mut ctx| async move {
            let mine = &shares[ctx.party() as usize];
            let lt = less_than(&mut ctx, &mine[0], &mine[1]).await?;
            assert_eq!(ctx.supply().remaining_triples(), 0);
            assert_eq!(ctx.supply().remaining_tuples(), 0);
            Ok(lt)
        })
        .await?;
        assert_eq!(f.add(&lt1, &lt2), BigUint::from(expected), "{a} < {b}");
    }
    Ok(())
}

#[tokio::test]
async fn compare_vectors() -> Result<(), Error> {
    let f = field();
    let mut rng = ChaCha20Rng::seed_from_u64(5);
    let n = 40;
    let a: Vec<u32> = (0..n).map(|_| rng.random_range(0..32761)).collect();
    let mut b: Vec<u32> = (0..n).map(|_| rng.random_range(0..32761)).collect();
    b[0] = a[0];
    let expected: Vec<BigUint> = a
        .iter()
        .zip(&b)
        .map(|(a, b)| BigUint::from((a < b) as u32))
        .collect();

    let mut dealer = Dealer::seeded(f.clone(), 6);
    let (a, b) = (share(&mut dealer, &a), share(&mut dealer, &b));
    let supplies = dealer.deal(n * triples_for_comparison(L), n, ReusePolicy::SingleUse);
    let (a, b) = (&a, &b);
    let lt = simulate(&f, supplies, move |mut ctx| async move {
        let i = ctx.party() as usize;
        less_than_vec(&mut ctx, &a[i], &b[i]).await
    })
    .await?;
    assert_eq!(open(&f, &lt), expected);
    Ok(())
}

#[tokio::test]
async fn reuse_policy_stays_correct() -> Result<(), Error> {
    let f = field();
    let mut dealer = Dealer::seeded(f.clone(), 7);
    let a = share(&mut dealer, &[1, 500, 32000]);
    let b = share(&mut dealer, &[2, 500, 31999]);
    let supplies = dealer.deal(1, 1, ReusePolicy::Reuse);
    let (a, b) = (&a, &b);
    let (lt, eq) = simulate(&f, supplies, move |mut ctx| async move {
        let i = ctx.party() as usize;
        let lt = less_than_vec(&mut ctx, &a[i], &b[i]).await?;
        let eq = equal_vec(&mut ctx, &a[i], &b[i]).await?;
        assert_eq!(ctx.supply().remaining_triples(), 1);
        Ok((lt, eq))
    })
    .await
    .map(|((lt1, eq1), (lt2, eq2))| ((lt1, lt2), (eq1, eq2)))?;
    let bits = |v: &[u32]| v.iter().map(|&x| BigUint::from(x)).collect::<Vec<_>>();
    assert_eq!(open(&f, &lt), bits(&[1, 0, 0]));
    assert_eq!(open(&f, &eq), bits(&[0, 1, 0]));
    Ok(())
}

#[tokio::test]
async fn equality_fixed_cases() -> Result<(), Error> {
    let _g = init_tracing();
    let f = field();
    for (i, &(a, b, expected)) in [(42, 42, 1u32), (42, 43, 0), (0, 0, 1), (0, 32760, 0)]
        .iter()
        .enumerate()
    {
        let mut dealer = Dealer::seeded(f.clone(), 200 + i as u64);
        let shares = share(&mut dealer, &[a, b]);
        let supplies = dealer.deal(triples_for_equality(L), 1, ReusePolicy::SingleUse);
        let shares = &shares;
        let (eq1, eq2) = simulate(&f, supplies, move |mut ctx| async move {
            let mine = &shares[ctx.party() as usize];
            equal(&mut ctx, &mine[0], &mine[1]).await
        })
        .await?;
        assert_eq!(f.add(&eq1, &eq2), BigUint::from(expected), "{a} == {b}");
    }
    Ok(())
}

#[tokio::test]
async fn equality_vectors() -> Result<(), Error> {
    let f = field();
    let mut rng = ChaCha20Rng::seed_from_u64(8);
    let n = 30;
    let a: Vec<u32> = (0..n).map(|_| rng.random_range(0..32761)).collect();
    let b: Vec<u32> = a
        .iter()
        .map(|&x| if rng.random_bool(0.5) { x } else { rng.random_range(0..32761) })
        .collect();
    let expected: Vec<BigUint> = a
        .iter()
        .zip(&b)
        .map(|(a, b)| BigUint::from((a == b) as u32))
        .collect();

    let mut dealer = Dealer::seeded(f.clone(), 9);
    let (a, b) = (share(&mut dealer, &a), share(&mut dealer, &b));
    let supplies = dealer.deal(n * triples_for_equality(L), n, ReusePolicy::SingleUse);
    let (a, b) = (&a, &b);
    let eq = simulate(&f, supplies, move |mut ctx| async move {
        let i = ctx.party() as usize;
        equal_vec(&mut ctx, &a[i], &b[i]).await
    })
    .await?;
    assert_eq!(open(&f, &eq), expected);
    Ok(())
}

#[tokio::test]
async fn peer_length_mismatch_is_misuse() {
    let f = field();
    let result = simulate(&f, Default::default(), |mut ctx| async move {
        let n = match ctx.party() {
            PartyId::C1 => 2,
            PartyId::C2 => 3,
        };
        recover_vec(&mut ctx, &vec![BigUint::from(1u32); n]).await
    })
    .await;
    match result {
        Err(Error::Misuse(MisuseError::PeerLengthMismatch {
            phase,
            expected,
            actual,
        })) => {
            assert_eq!(phase, "recover");
            assert_eq!((expected, actual), (2, 3));
        }
        other => panic!("expected a peer length mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_tuples_are_reported() {
    let f = field();
    let supplies =
        Dealer::seeded(f.clone(), 10).deal(triples_for_comparison(L), 0, ReusePolicy::SingleUse);
    let result = simulate(&f, supplies, |mut ctx| async move {
        let x = BigUint::from(1u32);
        less_than(&mut ctx, &x, &x).await
    })
    .await;
    assert!(matches!(
        result,
        Err(Error::Misuse(MisuseError::TuplesExhausted {
            requested: 1,
            available: 0
        }))
    ));
}
