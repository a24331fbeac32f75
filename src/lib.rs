//! Two-party secure computation on additive secret shares over a prime field.
//!
//! Two non-colluding parties, C1 and C2, each hold one additive share of every secret value
//! `x = x1 + x2 mod p`. Using correlated randomness from a dealer, they jointly compute products,
//! comparisons and equality tests of shared values without learning the share of the other party
//! or the plaintext. The protocols are secure against semi-honest adversaries only.
//!
//! ## Main Components
//!
//! * [`channel`]: The [`channel::Channel`] abstraction for exchanging field elements with the
//!   other party, implemented over any duplex byte stream by [`channel::LineChannel`].
//! * [`field`]: Local arithmetic on shares, sharing of values and of public constants.
//! * [`dealer`]: Generation of Beaver triples and random-number tuples, either in-process or as a
//!   service that provisions both parties over the network.
//! * [`preprocessing`]: The pool of correlated randomness each party consumes online.
//! * [`protocol`]: Opening, multiplication, product reduction, comparison and equality.
//! * [`config`]: Protocol parameters that both parties must agree on.
//!
//! ## Basic Usage
//!
//! Each party needs to:
//!
//! 1. Agree with the other party on a [`config::ProtocolConfig`]
//! 2. Obtain its share of the correlated randomness using [`dealer::provision`]
//! 3. Connect to the other party and create a [`protocol::Context`]
//! 4. Call the same protocol functions as the other party, in the same order
//! 5. Open the results with [`protocol::recover`] or hand the shares on
//!
//! For simulated environments (testing/development), you can use [`protocol::simulate`] together
//! with [`dealer::Dealer::deal`].
//!
//! ## Example
//!
//! ```
//! use duoshare::{
//!     data_types::PartyId,
//!     dealer::Dealer,
//!     field::Field,
//!     preprocessing::{ReusePolicy, triples_for_comparison},
//!     protocol::{less_than, recover, simulate},
//! };
//! use num_bigint::BigUint;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), duoshare::protocol::Error> {
//! let field = Field::new(BigUint::from(65521u32), 16)?;
//! let mut dealer = Dealer::from_os_rng(field.clone());
//! let a = dealer.split(&BigUint::from(5u32));
//! let b = dealer.split(&BigUint::from(9u32));
//! let supplies = dealer.deal(triples_for_comparison(16), 1, ReusePolicy::SingleUse);
//!
//! let (a, b) = (&a, &b);
//! let (lt, _) = simulate(&field, supplies, |mut ctx| async move {
//!     let (a, b) = match ctx.party() {
//!         PartyId::C1 => (&a.0, &b.0),
//!         PartyId::C2 => (&a.1, &b.1),
//!     };
//!     let lt = less_than(&mut ctx, a, b).await?;
//!     recover(&mut ctx, &lt).await
//! })
//! .await?;
//! assert_eq!(lt, BigUint::from(1u32));
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod config;
pub mod data_types;
pub mod dealer;
pub mod field;
pub mod preprocessing;
pub mod protocol;
