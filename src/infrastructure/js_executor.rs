//! 页面脚本执行
//!
//! 查询页的表单操作（填 UDIN、选下拉框、找验证码图片）都是一小段 JS，
//! 大多数只回答"元素在不在 / 操作成没成功"。这里统一负责执行和取值，
//! 脚本本身由 `browser::chromium` 拼装。

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::AppResult;

/// 持有任务唯一的查询页
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 导航、点击等需要直接操作 page 的场景
    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        Ok(result.into_value()?)
    }

    /// 执行脚本并把返回值反序列化（例如验证码的 base64 字符串）
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let value = self.eval(js_code).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// 执行返回布尔值的脚本
    ///
    /// 页面还没渲染完时脚本可能返回 `undefined` / `null`，按 `false` 处理。
    pub async fn eval_flag(&self, js_code: impl Into<String>) -> AppResult<bool> {
        let value = self.eval(js_code).await?;
        Ok(as_flag(&value))
    }
}

fn as_flag(value: &JsonValue) -> bool {
    value.as_bool().unwrap_or(false)
}

/// 把选择器、UDIN 等文本编码为可以直接拼进 JS 源码的字面量
pub fn js_literal<T: Serialize + ?Sized>(value: &T) -> AppResult<String> {
    Ok(serde_json::to_string(value)?)
}
