//! Sign-in, registration and account recovery (`/auth`).
//!
//! Every request here is anonymous: a stale token must never ride along
//! with a fresh login.

use serde::Serialize;
use spesa_core::{
    AuthResponse, LoginRequest, MessageResponse, PhoneNumberRequest, RegisterRequest,
    ResetPasswordRequest, VerifyPhoneRequest,
};
use spesa_sync::{MutationEndpoint, Request, SyncClient, SyncResult, Tag};

use super::{json_body, AUTH};

fn post<A: Serialize>(kind: &'static str, path: &'static str) -> impl Fn(&A) -> SyncResult<Request> {
    move |args| {
        Ok(Request::post(path)
            .with_body(json_body(kind, args)?)
            .anonymous())
    }
}

#[derive(Clone)]
pub struct AuthApi {
    pub login: MutationEndpoint<LoginRequest, AuthResponse>,
    pub register: MutationEndpoint<RegisterRequest, AuthResponse>,
    pub verify_phone: MutationEndpoint<VerifyPhoneRequest, MessageResponse>,
    pub resend_code: MutationEndpoint<PhoneNumberRequest, MessageResponse>,
    pub request_password_reset: MutationEndpoint<PhoneNumberRequest, MessageResponse>,
    pub reset_password: MutationEndpoint<ResetPasswordRequest, MessageResponse>,
}

impl AuthApi {
    pub fn new(client: &SyncClient) -> Self {
        Self {
            login: client
                .mutation("login", post("login", "/auth/login"))
                .invalidates_tags(vec![Tag::kind(AUTH)]),
            register: client
                .mutation("register", post("register", "/auth/register"))
                .invalidates_tags(vec![Tag::kind(AUTH)]),
            verify_phone: client.mutation("verifyPhone", post("verifyPhone", "/auth/verify-phone")),
            resend_code: client.mutation("resendCode", post("resendCode", "/auth/resend-code")),
            request_password_reset: client.mutation(
                "requestPasswordReset",
                post("requestPasswordReset", "/auth/request-reset"),
            ),
            reset_password: client.mutation(
                "resetPassword",
                post("resetPassword", "/auth/reset-password"),
            ),
        }
    }
}
