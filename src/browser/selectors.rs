//! UDIN 查询页面的元素选择器

/// 查询表单
#[derive(Debug, Clone)]
pub struct PortalForm {
    pub authority_type: &'static str,
    pub authority_name: &'static str,
    pub mobile: &'static str,
    pub email: &'static str,
    pub udin: &'static str,
    pub disclaimer: &'static str,
    pub captcha_input: &'static str,
    pub send_otp: &'static str,
    pub otp_mobile: &'static str,
    pub verify_mobile: &'static str,
    pub otp_email: &'static str,
    pub verify_email: &'static str,
}

impl Default for PortalForm {
    fn default() -> Self {
        Self {
            authority_type: "#AuthorityType",
            authority_name: "#AuthorityName",
            mobile: "#Mobile",
            email: "#Email",
            udin: "#Udin",
            disclaimer: "#chkDisclaimer",
            captcha_input: "#captcha",
            send_otp: "#verifyUDINSendOTP",
            otp_mobile: "#otpMobile",
            verify_mobile: "#VerifyOTPBtnMobile",
            otp_email: "#otpEmail",
            verify_email: "#VerifyOTPBtnEmail",
        }
    }
}

/// 验证码图片的候选选择器，按顺序尝试
pub const CAPTCHA_IMAGE_CANDIDATES: &[&str] = &["img[alt='captcha']", "img.captcha", "img#captchaImg"];

/// 候选都没命中时，`src` 包含此片段的图片视为验证码
pub const CAPTCHA_SRC_HINT: &str = "cap";

/// 找到验证码后打在元素上的标记属性
pub const CAPTCHA_MARKER_ATTR: &str = "data-udin-captcha";
