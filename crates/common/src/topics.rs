//! Topic names shared by the orchestrator and its collaborators.
//!
//! Every request topic has a paired reply topic named `<topic>.reply`; see [`reply_topic`].

pub const REPLY_SUFFIX: &str = ".reply";

// Inbound commands handled by this service
pub const AUTH_REGISTER: &str = "auth.register";
pub const AUTH_LOGIN: &str = "auth.login";
pub const AUTH_VERIFY_TOKEN: &str = "auth.verifyToken";
pub const AUTH_VERIFICATION: &str = "auth.verification";
pub const AUTH_VERIFICATION_CONNECT: &str = "auth.verification.connect";
pub const AUTH_VERIFICATION_RESEND: &str = "auth.verification.resend";
pub const AUTH_REFRESH: &str = "auth.refresh";
pub const AUTH_DETAILS: &str = "auth.details";
pub const AUTH_REGISTER_BY_CODE: &str = "auth.registerByCode";
pub const AUTH_DETAILS_BY_CODE_COMPANY: &str = "auth.detailsByCodeCompany";
pub const AUTH_CHANGE_PASSWORD: &str = "auth.changePassword";

// User service
pub const USER_CREATE: &str = "user.create";
pub const USER_FIND_BY_EMAIL: &str = "user.findByEmail";
pub const USER_FIND_BY_EMAIL_OR_PHONE: &str = "user.findByEmailOrPhone";
pub const USER_UPDATE: &str = "user.update";
pub const USER_CHECK_PASSWORD: &str = "user.checkPassword";

// Company service
pub const COMPANY_CREATE: &str = "company.create";
pub const COMPANY_GET_BY_ID: &str = "company.get.by.id";
pub const COMPANY_GET_BY_CODE: &str = "company.getByCode";
pub const COMPANY_UPDATE: &str = "company.update";

// Mail service (event only)
pub const MAILER_SEND: &str = "mail.send";

/// Topics of the user service whose replies the orchestrator awaits.
pub const USER_TOPICS: [&str; 5] = [
    USER_CREATE,
    USER_FIND_BY_EMAIL,
    USER_FIND_BY_EMAIL_OR_PHONE,
    USER_UPDATE,
    USER_CHECK_PASSWORD,
];

/// Topics of the company service whose replies the orchestrator awaits.
pub const COMPANY_TOPICS: [&str; 4] = [
    COMPANY_CREATE,
    COMPANY_GET_BY_ID,
    COMPANY_GET_BY_CODE,
    COMPANY_UPDATE,
];

/// Reply topic paired with a request topic.
pub fn reply_topic(topic: &str) -> String {
    format!("{topic}{REPLY_SUFFIX}")
}
