//! 契约测试公共断言宏。

/// 断言结果是携带给定稳定错误码的失败。
///
/// # 设计动机（Why）
/// - 错误契约以稳定码为锚点：逐处手写 `expect_err` + `code()` 比较既冗长
///   又容易漏掉"必须失败"这半句断言，宏化后两者缺一不可。
///
/// # 使用方式（How）
/// ```ignore
/// assert_error_code!(gate.enter(), shoal_core::codes::GATE_CLOSED);
/// ```
/// - 第一个参数是 `Result<_, ShoalError>`；
/// - 第二个参数是 `codes` 模块里的稳定码常量。
macro_rules! assert_error_code {
    ($result:expr, $code:expr $(,)?) => {{
        match $result {
            Ok(_) => panic!("期待失败（错误码 {}），却得到成功结果", $code),
            Err(error) => assert_eq!(error.code(), $code, "错误码不符合契约"),
        }
    }};
}

pub(crate) use assert_error_code;
