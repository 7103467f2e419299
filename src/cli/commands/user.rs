use clap::Subcommand;
use serde_json::json;

use crate::cli::{connect, utils, OutputFormat};
use crate::config;
use crate::rbac::Role;
use crate::services::{NewUser, UserService};

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create a user account")]
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, help = "viewer, admin or super_admin")]
        role: Role,
        #[arg(long, env = "CAMPUS_USER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Create { email, name, role, password } => {
            let Some(password) = password else {
                utils::output_error(&output_format, "A password is required (--password or CAMPUS_USER_PASSWORD)")?;
                anyhow::bail!("missing password");
            };

            let pool = connect().await?;
            let users = UserService::new(pool, config::config().security.bcrypt_cost);
            let user = users.create_one(&NewUser { email, name, role, password }).await?;

            utils::output_success(
                &output_format,
                &format!("Created {} {}", user.role, user.email),
                Some(json!({ "id": user.id, "email": user.email, "role": user.role })),
            )
        }
    }
}
