//! The reference domain in which several implementations of a vending machine are
//! compared. A machine accepts coins and button presses; the correct behaviour is that
//! adding a coin is always acknowledged, and pressing a button dispenses the item if the
//! accumulated balance covers the price, after which the balance is reset.
//!
//! Besides the symbols and outputs, this module provides a handful of reference devices
//! (one correct, several faulty) which are used in tests and by the command line tool.
use std::{fmt::Display, sync::Arc};

use crate::prelude::*;

/// A coin, stored as its value in cents so that it can be hashed and compared exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coin(u32);

impl Coin {
    /// Creates a coin worth `cents` cents.
    pub const fn cents(cents: u32) -> Self {
        Self(cents)
    }

    /// Creates a coin from a decimal value like `0.5`. Returns `None` for values that are
    /// not positive or that are not a whole number of cents.
    pub fn from_value(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents <= 0.0 || (cents - value * 100.0).abs() > 1e-6 || cents > u32::MAX as f64 {
            return None;
        }
        Some(Self(cents as u32))
    }

    /// The value of the coin in cents.
    pub fn value_in_cents(&self) -> u32 {
        self.0
    }
}

/// Formats an amount given in cents the way it is written on the coins, i.e. `0.5`, `1`, `2`.
pub fn format_cents(cents: u32) -> String {
    if cents % 100 == 0 {
        format!("{}", cents / 100)
    } else {
        let fraction = format!("{:02}", cents % 100);
        format!("{}.{}", cents / 100, fraction.trim_end_matches('0'))
    }
}

impl Display for Coin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_cents(self.0))
    }
}

/// The label of a button, e.g. `coke`. The set of labels is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Item(Arc<str>);

impl Item {
    /// Creates an item with the given label.
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(Arc::from(label.as_ref()))
    }

    /// The label of the item.
    pub fn label(&self) -> &str {
        &self.0
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two kinds of actions a user can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    /// Insert a coin.
    AddCoin,
    /// Press the button for an item.
    PushButton,
}

/// An input symbol of a vending machine: an action kind together with its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VendingSymbol {
    /// Insert the given coin.
    AddCoin(Coin),
    /// Press the button for the given item.
    PushButton(Item),
}

impl VendingSymbol {
    /// Shorthand for [`VendingSymbol::AddCoin`] given a decimal coin value.
    ///
    /// # Panics
    /// If the value is not a valid coin, see [`Coin::from_value`].
    pub fn coin(value: f64) -> Self {
        Self::AddCoin(Coin::from_value(value).expect("not a valid coin value"))
    }

    /// Shorthand for [`VendingSymbol::PushButton`].
    pub fn button(label: impl AsRef<str>) -> Self {
        Self::PushButton(Item::new(label))
    }

    /// The kind of action this symbol represents.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::AddCoin(_) => ActionKind::AddCoin,
            Self::PushButton(_) => ActionKind::PushButton,
        }
    }
}

impl Show for VendingSymbol {
    fn show(&self) -> String {
        match self {
            Self::AddCoin(coin) => format!("add_coin({coin})"),
            Self::PushButton(item) => format!("push_button({item})"),
        }
    }
}

/// What a vending machine may answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VendingOutput {
    /// The coin was accepted.
    Ack,
    /// The balance does not cover the price.
    Insufficient,
    /// The item is dispensed.
    Dispense(Item),
    /// The coin was accepted and the machine reports its balance in cents.
    Credit(u32),
}

impl Show for VendingOutput {
    fn show(&self) -> String {
        match self {
            Self::Ack => "ack".to_string(),
            Self::Insufficient => "insufficient".to_string(),
            Self::Dispense(item) => format!("dispense({item})"),
            Self::Credit(cents) => format!("credit({})", format_cents(*cents)),
        }
    }
}

/// The coins accepted in the reference domain: 0.5, 1 and 2.
pub fn reference_coins() -> [Coin; 3] {
    [Coin::cents(50), Coin::cents(100), Coin::cents(200)]
}

/// The items offered in the reference domain.
pub fn reference_items() -> [Item; 3] {
    [Item::new("coke"), Item::new("peanuts"), Item::new("water")]
}

/// The alphabet of the reference domain, coins first and then buttons.
pub fn reference_alphabet() -> Alphabet<VendingSymbol> {
    alphabet_for(reference_coins(), reference_items())
}

/// Builds an alphabet from the given coins and items, coins first.
pub fn alphabet_for<C, I>(coins: C, items: I) -> Alphabet<VendingSymbol>
where
    C: IntoIterator<Item = Coin>,
    I: IntoIterator<Item = Item>,
{
    coins
        .into_iter()
        .map(VendingSymbol::AddCoin)
        .chain(items.into_iter().map(VendingSymbol::PushButton))
        .collect()
}

/// The price of every item in the reference domain, in cents.
pub const REFERENCE_PRICE: u32 = 200;

/// A vending machine that tracks its balance. With the threshold equal to the price it is
/// the correct implementation; other thresholds produce faulty variants.
#[derive(Debug, Clone)]
pub struct VendingMachine {
    price: u32,
    threshold: u32,
    balance: u32,
}

impl VendingMachine {
    /// A correct machine selling every item for `price` cents.
    pub fn new(price: u32) -> Self {
        Self::with_threshold(price, price)
    }

    /// A machine selling for `price`, but that dispenses as soon as the balance reaches
    /// `threshold` cents.
    pub fn with_threshold(price: u32, threshold: u32) -> Self {
        Self {
            price,
            threshold,
            balance: 0,
        }
    }

    /// The current balance in cents.
    pub fn balance(&self) -> u32 {
        self.balance
    }

    /// The price of an item.
    pub fn price(&self) -> u32 {
        self.price
    }

    fn push(&mut self, item: &Item) -> VendingOutput {
        if self.balance >= self.threshold {
            self.balance = 0;
            VendingOutput::Dispense(item.clone())
        } else {
            VendingOutput::Insufficient
        }
    }
}

impl Default for VendingMachine {
    fn default() -> Self {
        Self::new(REFERENCE_PRICE)
    }
}

impl Sul for VendingMachine {
    type Symbol = VendingSymbol;
    type Output = VendingOutput;

    fn reset(&mut self) -> Result<(), QueryFailure> {
        self.balance = 0;
        Ok(())
    }

    fn step(&mut self, symbol: &VendingSymbol) -> Result<VendingOutput, QueryFailure> {
        Ok(match symbol {
            VendingSymbol::AddCoin(coin) => {
                self.balance = self.balance.saturating_add(coin.value_in_cents());
                VendingOutput::Ack
            }
            VendingSymbol::PushButton(item) => self.push(item),
        })
    }
}

/// A machine that never tracks a balance: coins are acknowledged and every purchase is
/// refused.
#[derive(Debug, Clone, Default)]
pub struct ForgetfulVendingMachine;

impl Sul for ForgetfulVendingMachine {
    type Symbol = VendingSymbol;
    type Output = VendingOutput;

    fn reset(&mut self) -> Result<(), QueryFailure> {
        Ok(())
    }

    fn step(&mut self, symbol: &VendingSymbol) -> Result<VendingOutput, QueryFailure> {
        Ok(match symbol {
            VendingSymbol::AddCoin(_) => VendingOutput::Ack,
            VendingSymbol::PushButton(_) => VendingOutput::Insufficient,
        })
    }
}

/// A machine whose reset does nothing and which reports its credit for every coin. Its
/// outputs depend on everything that happened before, so from the point of view of a
/// learner it behaves non-deterministically.
#[derive(Debug, Clone)]
pub struct LeakyVendingMachine {
    inner: VendingMachine,
}

impl LeakyVendingMachine {
    /// Creates a leaky machine selling for `price` cents.
    pub fn new(price: u32) -> Self {
        Self {
            inner: VendingMachine::new(price),
        }
    }
}

impl Default for LeakyVendingMachine {
    fn default() -> Self {
        Self::new(REFERENCE_PRICE)
    }
}

impl Sul for LeakyVendingMachine {
    type Symbol = VendingSymbol;
    type Output = VendingOutput;

    fn reset(&mut self) -> Result<(), QueryFailure> {
        Ok(())
    }

    fn step(&mut self, symbol: &VendingSymbol) -> Result<VendingOutput, QueryFailure> {
        match self.inner.step(symbol)? {
            VendingOutput::Ack => Ok(VendingOutput::Credit(self.inner.balance())),
            other => Ok(other),
        }
    }
}

/// A correct machine that jams after a fixed number of steps, after which every step fails.
#[derive(Debug, Clone)]
pub struct FlakyVendingMachine {
    inner: VendingMachine,
    remaining: usize,
}

impl FlakyVendingMachine {
    /// Creates a machine that performs `steps` steps before it jams.
    pub fn new(price: u32, steps: usize) -> Self {
        Self {
            inner: VendingMachine::new(price),
            remaining: steps,
        }
    }
}

impl Sul for FlakyVendingMachine {
    type Symbol = VendingSymbol;
    type Output = VendingOutput;

    fn reset(&mut self) -> Result<(), QueryFailure> {
        self.inner.reset()
    }

    fn step(&mut self, symbol: &VendingSymbol) -> Result<VendingOutput, QueryFailure> {
        if self.remaining == 0 {
            return Err(QueryFailure::new("coin slot jammed"));
        }
        self.remaining -= 1;
        self.inner.step(symbol)
    }
}

/// Representative input sequences together with the outputs the reference rules demand for
/// a machine selling every item for `price` cents. The rules are: adding a coin always
/// yields an acknowledgement, pressing a button dispenses the item if the accumulated
/// balance is at least the price and resets the balance, otherwise it yields
/// `insufficient`.
pub fn reference_cases(
    alphabet: &Alphabet<VendingSymbol>,
    price: u32,
) -> Vec<(Word<VendingSymbol>, Vec<VendingOutput>)> {
    let coins: Vec<Coin> = alphabet
        .universe()
        .filter_map(|sym| match sym {
            VendingSymbol::AddCoin(c) => Some(*c),
            _ => None,
        })
        .collect();
    let items: Vec<Item> = alphabet
        .universe()
        .filter_map(|sym| match sym {
            VendingSymbol::PushButton(i) => Some(i.clone()),
            _ => None,
        })
        .collect();

    let mut inputs: Vec<Word<VendingSymbol>> = vec![];
    // every single symbol from the initial state
    inputs.extend(alphabet.universe().map(|sym| vec![sym.clone()]));
    for item in &items {
        let button = VendingSymbol::PushButton(item.clone());
        for coin in &coins {
            // fill up with the same coin until the price is reached, press once just below
            // and once at the price, then press again to see that the balance was reset
            let needed = price.div_ceil(coin.value_in_cents().max(1)) as usize;
            let mut word = vec![VendingSymbol::AddCoin(*coin); needed.saturating_sub(1)];
            word.push(button.clone());
            inputs.push(word);
            let mut word = vec![VendingSymbol::AddCoin(*coin); needed];
            word.push(button.clone());
            word.push(button.clone());
            inputs.push(word);
        }
    }

    inputs
        .into_iter()
        .map(|input| {
            let mut rules = VendingMachine::new(price);
            let expected = input
                .iter()
                .map(|sym| match sym {
                    VendingSymbol::AddCoin(c) => {
                        rules.balance = rules.balance.saturating_add(c.value_in_cents());
                        VendingOutput::Ack
                    }
                    VendingSymbol::PushButton(item) => rules.push(item),
                })
                .collect();
            (input, expected)
        })
        .collect()
}
