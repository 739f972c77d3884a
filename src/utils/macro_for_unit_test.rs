/// 错误断言宏 - 灵活粒度验证 Result 错误
///
/// # 用法
/// - `assert_err!(expr)`：只验证是 Err
/// - `assert_err!(expr, Variant(literal))`：验证错误类型 + 精确内容（单字段 String 变体）
/// - `assert_err!(expr, ShapeMismatch(name, exp, got))`：验证 ShapeMismatch（简洁语法）
/// - `assert_err!(expr, Pattern { .. })`：验证错误类型
/// - `assert_err!(expr, Pattern { field, .. } if condition)`：验证类型 + 条件
///
/// # 示例
/// ```ignore
/// // 只验证是错误
/// assert_err!(result);
///
/// // 验证错误类型 + 精确内容
/// assert_err!(registry.lookup("Foo"), OptimError::NotFound("Foo"));
///
/// // ShapeMismatch 简洁语法（按顺序：name, expected, got）
/// assert_err!(result, OptimError::ShapeMismatch("w", [2, 2], [3, 2]));
///
/// // 验证类型 + 关键字段
/// assert_err!(result, OptimError::InvalidHyperParam { name, .. } if name == "lr");
/// ```
#[macro_export]
macro_rules! assert_err {
    // 只验证是 Err
    ($expr:expr) => {
        assert!($expr.is_err(), "预期 Err，实际得到 {:?}", $expr);
    };
    // 简洁语法：Variant(字符串字面量) - 精确匹配 String 内容
    ($expr:expr, $err_type:ident :: $variant:ident ( $expected:literal )) => {
        match &$expr {
            Err($err_type::$variant(actual)) => assert_eq!(
                actual, $expected,
                "错误内容不匹配：预期 `{}`，实际得到 `{}`",
                $expected, actual
            ),
            Err(e) => panic!(
                "错误类型不匹配：预期 `{}::{}`，实际得到 `{:?}`",
                stringify!($err_type), stringify!($variant), e
            ),
            Ok(_) => panic!(
                "预期 Err({}::{})，实际得到 Ok",
                stringify!($err_type), stringify!($variant)
            ),
        }
    };
    // 简洁语法：ShapeMismatch(name, expected, got)
    ($expr:expr, $err_type:ident :: ShapeMismatch ( $name:expr, $exp:expr, $got:expr )) => {
        match &$expr {
            Err($err_type::ShapeMismatch { name, expected, got }) => {
                assert_eq!(name, $name, "name 不匹配");
                assert_eq!(expected.as_slice(), &$exp, "expected 不匹配");
                assert_eq!(got.as_slice(), &$got, "got 不匹配");
            }
            Err(e) => panic!(
                "错误类型不匹配：预期 `{}::ShapeMismatch`，实际得到 `{:?}`",
                stringify!($err_type), e
            ),
            Ok(_) => panic!(
                "预期 Err({}::ShapeMismatch)，实际得到 Ok",
                stringify!($err_type)
            ),
        }
    };
    // 通用模式匹配（带 if guard 或复杂 pattern）
    ($expr:expr, $($pattern:tt)+) => {
        match &$expr {
            Err(e) => assert!(
                matches!(e, $($pattern)+),
                "错误类型不匹配：预期 `{}`，实际得到 `{:?}`",
                stringify!($($pattern)+),
                e
            ),
            Ok(_) => panic!(
                "预期 Err 匹配 `{}`，实际得到 Ok",
                stringify!($($pattern)+)
            ),
        }
    };
}
