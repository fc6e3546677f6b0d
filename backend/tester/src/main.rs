use std::path::PathBuf;

use anyhow::{Context, bail};
use caldate_client::{
    ApiClient, AvatarUpload, GalleryManager, UploadFile,
    avatar::{remove_avatar, upload_avatar},
    gallery::{remove_photo, upload_photo},
};
use caldate_payloads::{UpdateProfile, uploads::MAX_GALLERY_PHOTOS};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "CALDATE_URL", default_value = "http://localhost:1111")]
    url: String,

    /// Session JWT of the signed-in user.
    #[arg(long, env = "CALDATE_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Own profile, or someone else's with --handle.
    Show {
        #[arg(long)]
        handle: Option<String>,
    },

    Profile {
        username: String,

        #[arg(long)]
        display_name: Option<String>,

        #[arg(long)]
        bio: Option<String>,

        #[arg(long)]
        booking_url: Option<String>,

        #[arg(long)]
        theme: Option<String>,
    },

    Avatar {
        file: PathBuf,
    },

    RemoveAvatar,

    /// Lists gallery photos, newest first.
    Photos,

    /// Uploads each file until the gallery is full.
    Gallery {
        files: Vec<PathBuf>,
    },

    RemovePhoto {
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let api = ApiClient::new(&args.url, args.token);

    match args.command {
        Command::Show { handle } => {
            let profile = match handle {
                Some(handle) => api.public_profile(&handle).await?,
                None => api.profile().await?,
            };
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Profile {
            username,
            display_name,
            bio,
            booking_url,
            theme,
        } => {
            let update = UpdateProfile {
                username,
                display_name,
                bio,
                booking_url,
                theme,
            };
            if let Err(errors) = update.validate() {
                bail!("Invalid profile: {errors}");
            }

            api.update_profile(&update).await?;
            println!("Profile saved as @{}", update.username);
        }
        Command::Avatar { file } => {
            let profile = api.profile().await?;
            let mut widget = AvatarUpload::new(profile.avatar_url);
            let upload = UploadFile::from_path(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let url = upload_avatar(&api, &mut widget, upload, file.display().to_string()).await?;
            println!("Avatar is now {url}");
        }
        Command::RemoveAvatar => {
            let profile = api.profile().await?;
            let mut widget = AvatarUpload::new(profile.avatar_url);
            if !widget.can_remove() {
                println!("No avatar to remove");
                return Ok(());
            }

            remove_avatar(&api, &mut widget).await?;
            println!("Avatar removed");
        }
        Command::Photos => {
            for photo in api.gallery().await? {
                println!("{} {}", photo.id, photo.url);
            }
        }
        Command::Gallery { files } => {
            let mut gallery = GalleryManager::new(api.profile().await?.photos);

            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )?
                .progress_chars("=> "),
            );

            for path in files {
                if !gallery.can_add_more() {
                    pb.println(format!(
                        "Gallery is full ({MAX_GALLERY_PHOTOS} photos), skipping the rest"
                    ));
                    break;
                }
                pb.set_message(format!("Uploading {}", path.display()));

                let upload = UploadFile::from_path(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                match upload_photo(&api, &mut gallery, upload, path.display().to_string()).await {
                    Ok(photo) => pb.println(format!("{} -> {}", path.display(), photo.id)),
                    Err(e) => pb.println(format!("{} failed: {e}", path.display())),
                }
                gallery.settle();

                pb.inc(1);
            }

            pb.finish_with_message("Done");
            println!("Gallery has {} photos", gallery.photos().len());
        }
        Command::RemovePhoto { id } => {
            let mut gallery = GalleryManager::new(api.profile().await?.photos);
            if gallery.photos().iter().all(|photo| photo.id != id) {
                bail!("Photo {id} is not in your gallery");
            }

            remove_photo(&api, &mut gallery, id).await?;
            println!("Removed {id}, {} photos left", gallery.photos().len());
        }
    }

    Ok(())
}
