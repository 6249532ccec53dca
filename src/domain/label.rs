// ============================================================
// Layer 3 — Label / Domain Codec
// ============================================================
// A label id packs two numbers:
//
//   domain = label_id div num_classes
//   class  = label_id mod num_classes
//
// The codec refuses label ids outside [0, num_domains * num_classes)
// when a dataset is built, so batching can split without checking.

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelCodec {
    num_domains: usize,
    num_classes: usize,
}

impl LabelCodec {
    /// Build a codec for `num_labels` labels grouped `num_classes` per domain.
    pub fn new(num_labels: usize, num_classes: usize) -> Result<Self, DomainError> {
        if num_classes == 0 {
            return Err(DomainError::EmptyDomainClasses);
        }
        if num_labels == 0 || num_labels % num_classes != 0 {
            return Err(DomainError::IndivisibleLabels { num_labels, num_classes });
        }
        Ok(Self { num_domains: num_labels / num_classes, num_classes })
    }

    pub fn num_domains(&self) -> usize { self.num_domains }

    pub fn num_classes(&self) -> usize { self.num_classes }

    pub fn num_labels(&self) -> usize { self.num_domains * self.num_classes }

    /// Split a label id into `(domain, class)`.
    pub fn split(&self, label: usize) -> Result<(usize, usize), DomainError> {
        if label >= self.num_labels() {
            return Err(DomainError::LabelOutOfRange { label, num_labels: self.num_labels() });
        }
        Ok((label / self.num_classes, label % self.num_classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_indivisible_label_count() {
        assert_eq!(
            LabelCodec::new(5, 2),
            Err(DomainError::IndivisibleLabels { num_labels: 5, num_classes: 2 })
        );
    }

    #[test]
    fn test_rejects_zero_classes() {
        assert_eq!(LabelCodec::new(4, 0), Err(DomainError::EmptyDomainClasses));
    }

    #[test]
    fn test_split_covers_every_label() {
        let codec = LabelCodec::new(6, 2).unwrap();
        assert_eq!(codec.num_domains(), 3);
        for label in 0..codec.num_labels() {
            let (domain, class) = codec.split(label).unwrap();
            assert!(domain < codec.num_domains());
            assert!(class < codec.num_classes());
            assert_eq!(domain * codec.num_classes() + class, label);
        }
    }

    #[test]
    fn test_split_rejects_out_of_range() {
        let codec = LabelCodec::new(4, 2).unwrap();
        assert_eq!(codec.split(3), Ok((1, 1)));
        assert!(matches!(codec.split(4), Err(DomainError::LabelOutOfRange { label: 4, .. })));
    }
}
