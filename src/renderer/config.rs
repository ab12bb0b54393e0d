use std::path::PathBuf;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use crate::renderer::resources::vertex::VertexLayout;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuiltinMesh {
    Triangle,
    #[default]
    Quad,
    Sphere,
}

/// Contains configuration options for the renderer like vsync, MSAA and the assets to display
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Forces FIFO presentation even when mailbox is available
    pub vsync: bool,
    /// Render into a multisampled color target resolved into the swapchain image
    pub msaa: bool,
    pub frames_in_flight: usize,
    pub vertex_layout: VertexLayout,
    /// Procedural mesh drawn when no model file is given
    pub builtin_mesh: BuiltinMesh,
    /// Resolved to `shaders-built/<name>.vert.spv` and `shaders-built/<name>.frag.spv`
    pub shader_name: String,
    pub model_path: Option<PathBuf>,
    pub texture_path: Option<PathBuf>,
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: false,
            msaa: true,
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            vertex_layout: VertexLayout::PositionColorTexcoord,
            builtin_mesh: BuiltinMesh::Quad,
            shader_name: "textured".into(),
            model_path: None,
            texture_path: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Command line options, each also settable through an `ORRERY_*` environment variable
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Wavefront OBJ model to display instead of the built-in mesh
    #[arg(long, env = "ORRERY_MODEL")]
    pub model: Option<PathBuf>,
    /// Built-in mesh drawn when no model is given
    #[arg(long, env = "ORRERY_MESH", value_enum, ignore_case = true, default_value_t = BuiltinMesh::Quad)]
    pub mesh: BuiltinMesh,
    /// Texture image; a checkerboard is generated when omitted
    #[arg(long, env = "ORRERY_TEXTURE")]
    pub texture: Option<PathBuf>,
    /// Force FIFO presentation
    #[arg(long, env = "ORRERY_VSYNC", action = ArgAction::Set, value_parser = BoolishValueParser::new(),
        default_value = "false", num_args = 0..=1, default_missing_value = "true")]
    pub vsync: bool,
    /// Render with multisampling
    #[arg(long, env = "ORRERY_MSAA", action = ArgAction::Set, value_parser = BoolishValueParser::new(),
        default_value = "true", num_args = 0..=1, default_missing_value = "true")]
    pub msaa: bool,
}

impl From<Args> for RenderConfig {
    fn from(args: Args) -> Self {
        Self {
            vsync: args.vsync,
            msaa: args.msaa,
            builtin_mesh: args.mesh,
            model_path: args.model,
            texture_path: args.texture,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn config_from(args: &[&str]) -> RenderConfig {
        let argv = std::iter::once("orrery").chain(args.iter().copied());
        RenderConfig::from(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_use_two_frames_in_flight() {
        let config = RenderConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert!(config.msaa);
        assert!(!config.vsync);
        assert!(config.model_path.is_none());
        assert_eq!(config.builtin_mesh, BuiltinMesh::Quad);
    }

    #[test]
    fn test_no_arguments_match_defaults() {
        let config = config_from(&[]);
        let defaults = RenderConfig::default();
        assert_eq!(config.msaa, defaults.msaa);
        assert_eq!(config.vsync, defaults.vsync);
        assert_eq!(config.builtin_mesh, defaults.builtin_mesh);
        assert_eq!(config.frames_in_flight, defaults.frames_in_flight);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            "--model", "models/room.obj",
            "--vsync", "on",
            "--msaa", "0",
            "--mesh", "Sphere",
        ]);
        assert_eq!(config.builtin_mesh, BuiltinMesh::Sphere);
        assert_eq!(config.model_path, Some(PathBuf::from("models/room.obj")));
        assert!(config.texture_path.is_none());
        assert!(config.vsync);
        assert!(!config.msaa);
    }

    #[test]
    fn test_bare_flag_enables() {
        assert!(config_from(&["--vsync"]).vsync);
    }

    #[test]
    fn test_unrecognized_values_are_rejected() {
        assert!(Args::try_parse_from(["orrery", "--msaa", "maybe"]).is_err());
        assert!(Args::try_parse_from(["orrery", "--mesh", "teapot"]).is_err());
    }

    #[test]
    fn test_every_option_reads_the_environment() {
        let command = Args::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(|name| name.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("model").as_deref(), Some("ORRERY_MODEL"));
        assert_eq!(env_of("mesh").as_deref(), Some("ORRERY_MESH"));
        assert_eq!(env_of("texture").as_deref(), Some("ORRERY_TEXTURE"));
        assert_eq!(env_of("vsync").as_deref(), Some("ORRERY_VSYNC"));
        assert_eq!(env_of("msaa").as_deref(), Some("ORRERY_MSAA"));
    }
}
