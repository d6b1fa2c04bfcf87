use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use tera::{Context, Tera};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{auth::federated::Provider, error::AppError, users::User};

/// Page templates, compiled into the binary.
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("submit.html", include_str!("../templates/submit.html")),
    ("secrets.html", include_str!("../templates/secrets.html")),
];

#[derive(Serialize)]
struct ProviderLink {
    slug: &'static str,
    label: &'static str,
}

#[derive(Serialize)]
struct SecretItem {
    text: String,
    posted: Option<String>,
}

pub struct Views {
    tera: Tera,
}

impl Views {
    pub fn new() -> anyhow::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.to_vec())?;
        Ok(Self { tera })
    }

    fn render(&self, name: &str, ctx: &Context) -> Result<Html<String>, AppError> {
        self.tera
            .render(name, ctx)
            .map(Html)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context(format!("render {name}"))))
    }

    pub fn home(&self, signed_in: bool) -> Result<Html<String>, AppError> {
        let mut ctx = Context::new();
        ctx.insert("signed_in", &signed_in);
        self.render("home.html", &ctx)
    }

    /// Register or login form, optionally with an error message and the
    /// username refilled.
    pub fn credentials_form(
        &self,
        template: &str,
        status: StatusCode,
        message: &str,
        username: &str,
        providers: &[Provider],
    ) -> Result<Response, AppError> {
        let links: Vec<ProviderLink> = providers
            .iter()
            .map(|p| ProviderLink {
                slug: p.as_str(),
                label: p.label(),
            })
            .collect();
        let mut ctx = Context::new();
        ctx.insert("signed_in", &false);
        ctx.insert("message", message);
        ctx.insert("username", username);
        ctx.insert("providers", &links);
        Ok((status, self.render(template, &ctx)?).into_response())
    }

    pub fn submit(
        &self,
        status: StatusCode,
        message: &str,
        user: &User,
    ) -> Result<Response, AppError> {
        let mut ctx = Context::new();
        ctx.insert("signed_in", &true);
        ctx.insert("message", message);
        ctx.insert("current_secret", &user.secret);
        Ok((status, self.render("submit.html", &ctx)?).into_response())
    }

    pub fn secrets(&self, users: &[User]) -> Result<Html<String>, AppError> {
        let items: Vec<SecretItem> = users
            .iter()
            .filter_map(|u| {
                u.secret.as_ref().map(|text| SecretItem {
                    text: text.clone(),
                    posted: u.last_posted.and_then(format_timestamp),
                })
            })
            .collect();
        let mut ctx = Context::new();
        ctx.insert("signed_in", &true);
        ctx.insert("secrets", &items);
        self.render("secrets.html", &ctx)
    }
}

fn format_timestamp(ts: OffsetDateTime) -> Option<String> {
    ts.format(&Rfc3339).ok()
}
