// Instruction builder - the text sent with the garment photo on every call

use super::poses::PoseDescription;
use super::types::SessionSeed;

/// Build the instruction for one pose
///
/// Deterministic in its inputs: the same pose, index, seed and extra
/// instruction always produce the same text.
pub fn build_instruction(
    pose: &PoseDescription,
    pose_index: u32,
    shoot_size: usize,
    seed: &SessionSeed,
    extra_instruction: Option<&str>,
) -> String {
    let mut prompt = format!(
        r#"Study the saree in the attached photo and generate a photograph of a model wearing exactly this saree.

GARMENT
- Reproduce the body colour, border (placement, width, colours, pattern), pallu and fabric sheen exactly as photographed.
- Do not add, remove, simplify or embellish any pattern, motif or decoration.

MODEL IDENTITY
- Reference seed: {seed}
- The same model, face, skin tone, build, hair, jewellery and makeup must appear in every photo of this shoot.

SHOT
- This is photo {index} of {size} in a continuous photoshoot.
- Pose: {pose}
- Camera angle: {angle}
- The pose and camera angle are the only things that change between photos.

CAMERA AND LIGHTING
- Full body, head to toe, portrait orientation, 85mm eye-level framing.
- Pure white background, soft even studio lighting, border in sharp focus.
"#,
        seed = seed,
        index = pose_index,
        size = shoot_size,
        pose = pose.pose,
        angle = pose.camera_angle,
    );

    if let Some(extra) = extra_instruction.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\nADDITIONAL INSTRUCTIONS\n");
        prompt.push_str(extra);
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\nGenerate photo {}/{}: same model (seed: {}), same saree, pose as described.",
        pose_index, shoot_size, seed
    ));

    prompt
}
