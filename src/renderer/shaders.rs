//! GLSL ES 3.00 sources for surface rendering
//!
//! One vertex shader is shared by every program; each supported pixel format
//! gets its own fragment shader.

/// Places the unit quad with the `transform` uniform
pub const QUAD_VERTEX_SHADER: &str = r#"#version 300 es
uniform mat4 transform;
layout(location = 0) in vec2 position;
layout(location = 1) in vec2 tex_coords;
out vec2 v_tex_coords;

void main() {
    gl_Position = transform * vec4(position, 0.0, 1.0);
    v_tex_coords = tex_coords;
}
"#;

/// Samples an opaque texture, forcing alpha to one
pub const RGB_FRAGMENT_SHADER: &str = r#"#version 300 es
precision mediump float;
uniform sampler2D tex;
in vec2 v_tex_coords;
out vec4 frag_color;

void main() {
    frag_color = vec4(texture(tex, v_tex_coords).rgb, 1.0);
}
"#;

/// Samples a texture with its own alpha channel
pub const RGBA_FRAGMENT_SHADER: &str = r#"#version 300 es
precision mediump float;
uniform sampler2D tex;
in vec2 v_tex_coords;
out vec4 frag_color;

void main() {
    frag_color = texture(tex, v_tex_coords);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_target_gles3() {
        for source in [QUAD_VERTEX_SHADER, RGB_FRAGMENT_SHADER, RGBA_FRAGMENT_SHADER] {
            assert!(source.starts_with("#version 300 es"));
        }
    }

    #[test]
    fn test_vertex_shader_declares_transform() {
        assert!(QUAD_VERTEX_SHADER.contains("uniform mat4 transform"));
    }
}
