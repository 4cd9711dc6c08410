use std::ops::RangeBounds;

pub trait WithinExt {
    fn within(&self, range: impl RangeBounds<Self>) -> bool;
}

impl <T: PartialOrd<T>> WithinExt for T {
    fn within(&self, range: impl RangeBounds<Self>) -> bool {
        range.contains(self)
    }
}

pub trait CollectionExt {
    type Item;

    /// Gets the first item that also appears earlier in the collection.
    fn first_duplicate(&self) -> Option<&Self::Item>;
}

impl <T: PartialEq> CollectionExt for [T] {
    type Item = T;

    fn first_duplicate(&self) -> Option<&T> {
        self.iter()
            .enumerate()
            .find(|&(i, item)| self[..i].contains(item))
            .map(|(_, item)| item)
    }
}
