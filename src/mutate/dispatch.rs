//! Name-keyed registry over the mutator set, mirroring `parser::resolve`'s
//! `Box<dyn Trait>` lookup and the teacher's `Implementations`/`Dispatch`
//! enum-dispatch idiom (`crate::mutate::dispatch` in the teacher repo).
use super::*;
use crate::error::CampaignError;

#[derive(Clone, Copy, Debug)]
pub enum Implementations {
    Null,
    Purge,
    RandomByte,
    AddRandomData,
    RemoveByte,
    DuplicateByte,
    ByteNullifier,
    SetHighBitFromByte,
    IncreaseByOne,
    DecreaseByOne,
    ProgressiveIncrease,
    ProgressiveDecrease,
    SwapByte,
    SwapWord,
    SwapDword,
    RemoveLines,
    RepeatLine,
    SwapLines,
    SwapAdjacentLines,
    QuotedTextualNumber,
}

/// The full set of mutator names a `Mutators` configuration list may
/// reference, in registration order.
pub const NAMES: &[&str] = &[
    "Null",
    "Purge",
    "RandomByte",
    "AddRandomData",
    "RemoveByte",
    "DuplicateByte",
    "ByteNullifier",
    "SetHighBitFromByte",
    "IncreaseByOne",
    "DecreaseByOne",
    "ProgressiveIncrease",
    "ProgressiveDecrease",
    "SwapByte",
    "SwapWord",
    "SwapDword",
    "RemoveLines",
    "RepeatLine",
    "SwapLines",
    "SwapAdjacentLines",
    "QuotedTextualNumber",
];

/// A boxed mutator plus the name it was resolved from, so candidate ids
/// (`strategy.rs`'s `cid`) can be rebuilt from live trait objects.
#[derive(Debug)]
pub struct Dispatch {
    pub name: &'static str,
    pub implementation: Implementations,
}

impl Dispatch {
    pub fn resolve(name: &str) -> Result<Self, CampaignError> {
        let (name, implementation) = match name {
            "Null" => ("Null", Implementations::Null),
            "Purge" => ("Purge", Implementations::Purge),
            "RandomByte" => ("RandomByte", Implementations::RandomByte),
            "AddRandomData" => ("AddRandomData", Implementations::AddRandomData),
            "RemoveByte" => ("RemoveByte", Implementations::RemoveByte),
            "DuplicateByte" => ("DuplicateByte", Implementations::DuplicateByte),
            "ByteNullifier" => ("ByteNullifier", Implementations::ByteNullifier),
            "SetHighBitFromByte" => ("SetHighBitFromByte", Implementations::SetHighBitFromByte),
            "IncreaseByOne" => ("IncreaseByOne", Implementations::IncreaseByOne),
            "DecreaseByOne" => ("DecreaseByOne", Implementations::DecreaseByOne),
            "ProgressiveIncrease" => ("ProgressiveIncrease", Implementations::ProgressiveIncrease),
            "ProgressiveDecrease" => ("ProgressiveDecrease", Implementations::ProgressiveDecrease),
            "SwapByte" => ("SwapByte", Implementations::SwapByte),
            "SwapWord" => ("SwapWord", Implementations::SwapWord),
            "SwapDword" => ("SwapDword", Implementations::SwapDword),
            "RemoveLines" => ("RemoveLines", Implementations::RemoveLines),
            "RepeatLine" => ("RepeatLine", Implementations::RepeatLine),
            "SwapLines" => ("SwapLines", Implementations::SwapLines),
            "SwapAdjacentLines" => ("SwapAdjacentLines", Implementations::SwapAdjacentLines),
            "QuotedTextualNumber" => ("QuotedTextualNumber", Implementations::QuotedTextualNumber),
            other => {
                return Err(CampaignError::Configuration(format!(
                    "unknown mutator '{other}'"
                )))
            }
        };
        Ok(Self { name, implementation })
    }
}

impl Mutate for Dispatch {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8> {
        match self.implementation {
            Implementations::Null => Null.mutate(data, howmany),
            Implementations::Purge => Purge.mutate(data, howmany),
            Implementations::RandomByte => RandomByte.mutate(data, howmany),
            Implementations::AddRandomData => AddRandomData.mutate(data, howmany),
            Implementations::RemoveByte => RemoveByte.mutate(data, howmany),
            Implementations::DuplicateByte => DuplicateByte.mutate(data, howmany),
            Implementations::ByteNullifier => ByteNullifier.mutate(data, howmany),
            Implementations::SetHighBitFromByte => SetHighBitFromByte.mutate(data, howmany),
            Implementations::IncreaseByOne => IncreaseByOne.mutate(data, howmany),
            Implementations::DecreaseByOne => DecreaseByOne.mutate(data, howmany),
            Implementations::ProgressiveIncrease => ProgressiveIncrease.mutate(data, howmany),
            Implementations::ProgressiveDecrease => ProgressiveDecrease.mutate(data, howmany),
            Implementations::SwapByte => SwapByte.mutate(data, howmany),
            Implementations::SwapWord => SwapWord.mutate(data, howmany),
            Implementations::SwapDword => SwapDword.mutate(data, howmany),
            Implementations::RemoveLines => RemoveLines.mutate(data, howmany),
            Implementations::RepeatLine => RepeatLine.mutate(data, howmany),
            Implementations::SwapLines => SwapLines.mutate(data, howmany),
            Implementations::SwapAdjacentLines => SwapAdjacentLines.mutate(data, howmany),
            Implementations::QuotedTextualNumber => QuotedTextualNumber.mutate(data, howmany),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_every_listed_name() {
        for name in NAMES {
            assert!(Dispatch::resolve(name).is_ok(), "failed to resolve {name}");
        }
    }

    #[test]
    fn resolve_rejects_unknown_name() {
        assert!(Dispatch::resolve("NotAMutator").is_err());
    }

    #[test]
    fn dispatch_delegates_to_implementation() {
        let d = Dispatch::resolve("Purge").unwrap();
        assert_eq!(d.mutate(b"abc", 0), Vec::<u8>::new());
    }
}
