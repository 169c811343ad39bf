//! 環境オーバーライドのマージ規則

use std::collections::BTreeMap;

/// 環境オーバーライドを適用できる設定
///
/// `other` で定義されたフィールドが優先される（オーバーライド）。
/// - Option<T>: other が Some ならそれを使用、None なら元の値を維持
/// - ネストした設定: フィールドごとに再帰的にマージ
/// - リスト: 丸ごと置き換え（ディープマージしない）
/// - 加算的なマップ（variables, secrets）: キー単位でマージ（other が優先）
pub trait Overlay {
    fn overlay(&mut self, other: Self);
}

/// other が Some なら上書き
pub(crate) fn replace<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

/// ネストした設定をフィールド単位でマージ
pub(crate) fn merge<T: Overlay>(base: &mut Option<T>, other: Option<T>) {
    match (base.as_mut(), other) {
        (Some(existing), Some(other)) => existing.overlay(other),
        (None, Some(other)) => *base = Some(other),
        (_, None) => {}
    }
}

/// 加算的なマップをマージ
pub(crate) fn extend(base: &mut BTreeMap<String, String>, other: BTreeMap<String, String>) {
    for (key, value) in other {
        base.insert(key, value);
    }
}
