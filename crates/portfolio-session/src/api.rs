//! Typed wrappers for the portfolio backend
//!
//! Reads go to `/public/...` and are open to anyone; writes go to
//! `/admin/...` and need an admin bearer token, which the pipeline attaches.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::ApiClient;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub live_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// ISO-8601 local date-time, as the backend sends it
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub proficiency_level: Option<i32>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub years_of_experience: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub company: String,
    pub position: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub current: bool,
    #[serde(default)]
    pub company_logo_url: Option<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

pub struct ProjectsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ProjectsApi<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn all(&self) -> Result<Vec<Project>> {
        self.client.get(&["public", "projects"]).await
    }

    pub async fn featured(&self) -> Result<Vec<Project>> {
        self.client.get(&["public", "projects", "featured"]).await
    }

    pub async fn by_id(&self, id: i64) -> Result<Project> {
        self.client
            .get(&["public", "projects", &id.to_string()])
            .await
    }

    pub async fn by_category(&self, category: &str) -> Result<Vec<Project>> {
        self.client
            .get(&["public", "projects", "category", category])
            .await
    }

    pub async fn by_technology(&self, technology: &str) -> Result<Vec<Project>> {
        self.client
            .get(&["public", "projects", "technology", technology])
            .await
    }

    pub async fn create(&self, project: &Project) -> Result<Project> {
        self.client.post(&["admin", "projects"], project).await
    }

    pub async fn update(&self, id: i64, project: &Project) -> Result<Project> {
        self.client
            .put(&["admin", "projects", &id.to_string()], project)
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.client
            .delete(&["admin", "projects", &id.to_string()])
            .await
    }
}

pub struct SkillsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> SkillsApi<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn all(&self) -> Result<Vec<Skill>> {
        self.client.get(&["public", "skills"]).await
    }

    pub async fn by_id(&self, id: i64) -> Result<Skill> {
        self.client
            .get(&["public", "skills", &id.to_string()])
            .await
    }

    pub async fn by_category(&self, category: &str) -> Result<Vec<Skill>> {
        self.client
            .get(&["public", "skills", "category", category])
            .await
    }

    /// Skills at proficiency `level` (1-5 on the backend)
    pub async fn by_level(&self, level: i32) -> Result<Vec<Skill>> {
        self.client
            .get(&["public", "skills", "level", &level.to_string()])
            .await
    }

    pub async fn create(&self, skill: &Skill) -> Result<Skill> {
        self.client.post(&["admin", "skills"], skill).await
    }

    pub async fn update(&self, id: i64, skill: &Skill) -> Result<Skill> {
        self.client
            .put(&["admin", "skills", &id.to_string()], skill)
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.client
            .delete(&["admin", "skills", &id.to_string()])
            .await
    }
}

pub struct ExperiencesApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ExperiencesApi<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn all(&self) -> Result<Vec<Experience>> {
        self.client.get(&["public", "experiences"]).await
    }

    pub async fn current(&self) -> Result<Vec<Experience>> {
        self.client.get(&["public", "experiences", "current"]).await
    }

    pub async fn by_id(&self, id: i64) -> Result<Experience> {
        self.client
            .get(&["public", "experiences", &id.to_string()])
            .await
    }

    pub async fn create(&self, experience: &Experience) -> Result<Experience> {
        self.client.post(&["admin", "experiences"], experience).await
    }

    pub async fn update(&self, id: i64, experience: &Experience) -> Result<Experience> {
        self.client
            .put(&["admin", "experiences", &id.to_string()], experience)
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.client
            .delete(&["admin", "experiences", &id.to_string()])
            .await
    }
}

impl ApiClient {
    pub fn projects(&self) -> ProjectsApi<'_> {
        ProjectsApi::new(self)
    }

    pub fn skills(&self) -> SkillsApi<'_> {
        SkillsApi::new(self)
    }

    pub fn experiences(&self) -> ExperiencesApi<'_> {
        ExperiencesApi::new(self)
    }
}
