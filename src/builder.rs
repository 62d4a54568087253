use crate::rcu::Rcu;
use std::marker::PhantomData;

/// Builder for configuring an `Rcu` cell.
///
/// Use this builder to customize how the cell starts out:
/// - `copier`: how readers obtain their private copy (given up front)
/// - `value`: an initial value to publish, skipping the first `update`
///
/// # Example
/// ```
/// use lockfree_epoch::RcuBuilder;
///
/// let cell = RcuBuilder::new(|s: &String| s.to_uppercase())
///     .value(String::from("seed"))
///     .build();
///
/// assert_eq!(cell.read().as_deref(), Some("SEED"));
/// ```
///
/// 用于配置 `Rcu` 单元的构建器。
pub struct RcuBuilder<T, C> {
    copier: C,
    value: Option<T>,
    _marker: PhantomData<fn(&T) -> T>,
}

impl<T, C> RcuBuilder<T, C>
where
    C: Fn(&T) -> T,
{
    /// Create a new builder around the reader copy function.
    /// 以读者复制函数创建一个新的构建器。
    #[inline]
    pub fn new(copier: C) -> Self {
        Self {
            copier,
            value: None,
            _marker: PhantomData,
        }
    }

    /// Publish `value` as soon as the cell is built.
    ///
    /// Default: no value; the first `read` returns `None`.
    ///
    /// 构建单元时立即发布 `value`。
    #[inline]
    pub fn value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    /// Build the `Rcu` with the configured settings.
    /// 使用配置的设置构建 `Rcu`。
    #[inline]
    pub fn build(self) -> Rcu<T, C> {
        match self.value {
            Some(value) => Rcu::with_value(self.copier, value),
            None => Rcu::with_copier(self.copier),
        }
    }
}

impl<T, C> std::fmt::Debug for RcuBuilder<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcuBuilder")
            .field("has_value", &self.value.is_some())
            .finish_non_exhaustive()
    }
}
