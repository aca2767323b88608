use serde::{Deserialize, Serialize};
use sprintboard_common::{Role, User};

use super::{Envelope, Validate, require_email, require_id, require_text};
use crate::errors::ApiError;
use crate::http::HttpClient;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ApiError> {
        require_email("email", &self.email)?;
        if self.password.is_empty() {
            return Err(ApiError::validation("password", "must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        require_text("name", &self.name, 255)?;
        require_email("email", &self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation(
                "password",
                format!("must be at least {} characters", MIN_PASSWORD_LEN),
            ));
        }
        if self.password != self.password_confirmation {
            return Err(ApiError::validation("password_confirmation", "does not match password"));
        }
        Ok(())
    }
}

/// `User` as the backend sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct UserResource {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default, alias = "avatar_url")]
    pub avatar: Option<String>,
}

fn default_role() -> Role {
    Role::Developer
}

impl TryFrom<UserResource> for User {
    type Error = ApiError;

    fn try_from(wire: UserResource) -> Result<Self, Self::Error> {
        require_id("user.id", wire.id)?;
        require_text("user.name", &wire.name, 255)?;
        Ok(User {
            id: wire.id,
            email: wire.email,
            name: wire.name,
            role: wire.role,
            avatar: wire.avatar.filter(|a| !a.is_empty()),
        })
    }
}

/// Response of `POST /login` and `POST /register`.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub user: UserResource,
    #[serde(alias = "access_token")]
    pub token: String,
}

/// `GET /me` answers with the user bare, under `data`, or under `user`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MeResponse {
    Keyed { user: UserResource },
    Enveloped(Envelope<UserResource>),
}

/// A validated credential pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub user: User,
    pub token: String,
}

impl TryFrom<AuthResponse> for Credentials {
    type Error = ApiError;

    fn try_from(wire: AuthResponse) -> Result<Self, Self::Error> {
        if wire.token.trim().is_empty() {
            return Err(ApiError::validation("token", "server returned an empty token"));
        }
        Ok(Credentials {
            user: wire.user.try_into()?,
            token: wire.token,
        })
    }
}

#[derive(Clone)]
pub struct AuthApi {
    http: HttpClient,
}

impl AuthApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Credentials, ApiError> {
        request.validate()?;
        let response: Envelope<AuthResponse> = self.http.post("login", request).await?;
        response.into_inner().try_into()
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Credentials, ApiError> {
        request.validate()?;
        let response: Envelope<AuthResponse> = self.http.post("register", request).await?;
        response.into_inner().try_into()
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.http.post_empty("logout", &serde_json::json!({})).await
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        let response: MeResponse = self.http.get("me").await?;
        let wire = match response {
            MeResponse::Keyed { user } => user,
            MeResponse::Enveloped(envelope) => envelope.into_inner(),
        };
        wire.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_validation() {
        let ok = LoginRequest {
            email: "ada@example.com".into(),
            password: "pw".into(),
        };
        assert!(ok.validate().is_ok());

        let bad_email = LoginRequest {
            email: "ada".into(),
            password: "pw".into(),
        };
        assert!(bad_email.validate().is_err());

        let no_password = LoginRequest {
            email: "ada@example.com".into(),
            password: String::new(),
        };
        assert!(no_password.validate().is_err());
    }

    #[test]
    fn test_register_request_requires_matching_confirmation() {
        let mut req = RegisterRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password: "correct horse".into(),
            password_confirmation: "correct horse".into(),
        };
        assert!(req.validate().is_ok());

        req.password_confirmation = "battery staple".into();
        match req.validate().unwrap_err() {
            ApiError::Validation { field, .. } => assert_eq!(field, "password_confirmation"),
            other => panic!("Expected Validation, got {:?}", other),
        }

        req.password = "short".into();
        req.password_confirmation = "short".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_auth_response_accepts_access_token_alias() {
        let json = r#"{
            "user": {"id": 1, "email": "a@b.co", "name": "A", "role": "admin"},
            "access_token": "tok"
        }"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        let creds = Credentials::try_from(resp).unwrap();
        assert_eq!(creds.token, "tok");
        assert_eq!(creds.user.role, Role::Admin);
    }

    #[test]
    fn test_credentials_reject_empty_token() {
        let json = r#"{"user": {"id": 1, "email": "a@b.co", "name": "A"}, "token": ""}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert!(Credentials::try_from(resp).is_err());
    }

    #[test]
    fn test_user_resource_normalization() {
        let json = r#"{"id": 4, "email": "g@h.io", "name": "Grace", "avatar_url": ""}"#;
        let wire: UserResource = serde_json::from_str(json).unwrap();
        let user = User::try_from(wire).unwrap();
        assert_eq!(user.role, Role::Developer);
        assert!(user.avatar.is_none());
    }

    #[test]
    fn test_me_response_shapes() {
        for json in [
            r#"{"id": 1, "email": "a@b.co", "name": "A"}"#,
            r#"{"data": {"id": 1, "email": "a@b.co", "name": "A"}}"#,
            r#"{"user": {"id": 1, "email": "a@b.co", "name": "A"}}"#,
        ] {
            let resp: MeResponse = serde_json::from_str(json).unwrap();
            let id = match resp {
                MeResponse::Keyed { user } => user.id,
                MeResponse::Enveloped(e) => e.into_inner().id,
            };
            assert_eq!(id, 1, "shape {}", json);
        }
    }
}
