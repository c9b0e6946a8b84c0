//! 查询表单的固定字段
//!
//! 上传时由操作员填写，未填写的字段使用配置中的默认值。

use crate::config::Config;

/// 每个 UDIN 都会填入的固定字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    pub authority_type: String,
    pub authority_name: String,
    pub mobile: String,
    pub email: String,
}

impl FormValues {
    /// 使用配置中的默认值
    pub fn from_config(config: &Config) -> Self {
        Self {
            authority_type: config.authority_type.clone(),
            authority_name: config.authority_name.clone(),
            mobile: config.mobile.clone(),
            email: config.email.clone(),
        }
    }

    /// 按表单字段名覆盖；空值不覆盖
    pub fn set(&mut self, field: &str, value: String) -> bool {
        let value = value.trim().to_string();
        if value.is_empty() {
            return false;
        }
        let slot = match field {
            "authority_type" => &mut self.authority_type,
            "authority_name" => &mut self.authority_name,
            "mobile" => &mut self.mobile,
            "email" => &mut self.email,
            _ => return false,
        };
        *slot = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overrides_known_fields_only() {
        let mut values = FormValues::from_config(&Config::default());
        assert_eq!(values.authority_type, "Others");

        assert!(values.set("mobile", " 9000000001 ".to_string()));
        assert!(!values.set("authority_type", "   ".to_string()));
        assert!(!values.set("unknown", "x".to_string()));

        assert_eq!(values.mobile, "9000000001");
        assert_eq!(values.authority_type, "Others");
    }
}
