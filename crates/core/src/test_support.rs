//! Headless stand-ins for the GPU renderer, stats panel and network.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec3;

use crate::camera::PerspectiveCamera;
use crate::loader::{next_frame, CancelToken, FetchError, Fetcher, Progress};
use crate::render::{RenderList, SceneRenderer};
use crate::scene::Scene;
use crate::stats::{StatsPanel, StatsSample};

/// One Y-up triangle with a half-meter unit, so the root starts at scale 0.5.
pub const TRIANGLE_DAE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><unit meter="0.5"/><up_axis>Y_UP</up_axis></asset>
  <library_geometries>
    <geometry id="tri-mesh" name="tri">
      <mesh>
        <source id="tri-pos">
          <float_array id="tri-pos-array" count="9">0 0 0 1 0 0 0 1 0</float_array>
          <technique_common><accessor source="#tri-pos-array" count="3" stride="3"/></technique_common>
        </source>
        <vertices id="tri-verts"><input semantic="POSITION" source="#tri-pos"/></vertices>
        <triangles count="1"><input semantic="VERTEX" source="#tri-verts" offset="0"/><p>0 1 2</p></triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="Scene" name="model">
      <node id="Tri" name="Tri"><instance_geometry url="#tri-mesh"/></node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#Scene"/></scene>
</COLLADA>"##;

/// One bone sliding two units along X over a second, skinning a triangle.
pub const SKINNED_DAE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><up_axis>Y_UP</up_axis></asset>
  <library_geometries>
    <geometry id="tri-mesh" name="tri">
      <mesh>
        <source id="tri-pos">
          <float_array id="tri-pos-array" count="9">0 0 0 1 0 0 0 1 0</float_array>
          <technique_common><accessor source="#tri-pos-array" count="3" stride="3"/></technique_common>
        </source>
        <vertices id="tri-verts"><input semantic="POSITION" source="#tri-pos"/></vertices>
        <triangles count="1"><input semantic="VERTEX" source="#tri-verts" offset="0"/><p>0 1 2</p></triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_controllers>
    <controller id="skin-ctrl" name="skin">
      <skin source="#tri-mesh">
        <bind_shape_matrix>1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>
        <source id="joints"><Name_array id="joints-array" count="1">Bone</Name_array></source>
        <source id="inv-bind">
          <float_array id="inv-bind-array" count="16">1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</float_array>
          <technique_common><accessor source="#inv-bind-array" count="1" stride="16"/></technique_common>
        </source>
        <source id="weights"><float_array id="weights-array" count="1">1</float_array></source>
        <joints>
          <input semantic="JOINT" source="#joints"/>
          <input semantic="INV_BIND_MATRIX" source="#inv-bind"/>
        </joints>
        <vertex_weights count="3">
          <input semantic="JOINT" source="#joints" offset="0"/>
          <input semantic="WEIGHT" source="#weights" offset="1"/>
          <vcount>1 1 1</vcount>
          <v>0 0 0 0 0 0</v>
        </vertex_weights>
      </skin>
    </controller>
  </library_controllers>
  <library_animations>
    <animation id="bone-anim" name="Slide">
      <source id="anim-in"><float_array id="anim-in-array" count="2">0 1</float_array></source>
      <source id="anim-out">
        <float_array id="anim-out-array" count="6">0 0 0 2 0 0</float_array>
        <technique_common><accessor source="#anim-out-array" count="2" stride="3"/></technique_common>
      </source>
      <sampler id="anim-sampler">
        <input semantic="INPUT" source="#anim-in"/>
        <input semantic="OUTPUT" source="#anim-out"/>
      </sampler>
      <channel source="#anim-sampler" target="Bone/location"/>
    </animation>
  </library_animations>
  <library_visual_scenes>
    <visual_scene id="Scene" name="Scene">
      <node id="Armature" name="Armature">
        <node id="Bone" name="Bone" sid="Bone" type="JOINT">
          <translate sid="location">0 0 0</translate>
        </node>
      </node>
      <node id="Body" name="Body">
        <instance_controller url="#skin-ctrl"><skeleton>#Bone</skeleton></instance_controller>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#Scene"/></scene>
</COLLADA>"##;

/// Serves files from memory, optionally after a number of yielded frames.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    delay: usize,
    hide_totals: bool,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, uri: &str, contents: &str) -> Self {
        self.files.insert(uri.to_string(), contents.as_bytes().to_vec());
        self
    }

    /// Yield this many frames before answering.
    pub fn with_delay(mut self, frames: usize) -> Self {
        self.delay = frames;
        self
    }

    pub fn without_totals(mut self) -> Self {
        self.hide_totals = true;
        self
    }
}

impl Fetcher for MemoryFetcher {
    async fn fetch(
        &self,
        uri: &str,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, FetchError> {
        for _ in 0..self.delay {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            next_frame().await;
        }
        let bytes = self.files.get(uri).cloned().ok_or_else(|| FetchError::NotFound {
            uri: uri.to_string(),
        })?;
        let total = (!self.hide_totals).then_some(bytes.len() as u64);
        let half = bytes.len() as u64 / 2;
        progress(Progress { loaded: half, total });
        progress(Progress {
            loaded: bytes.len() as u64,
            total,
        });
        Ok(bytes)
    }
}

/// Renderer that records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub pixel_ratio: f64,
    pub size: (u32, u32),
    pub frames: usize,
    pub camera_positions: Vec<Vec3>,
    pub last_vertex_count: usize,
    /// Fail the frame with this (1-based) number.
    pub fail_on_frame: Option<usize>,
}

impl SceneRenderer for RecordingRenderer {
    type Error = String;

    fn set_pixel_ratio(&mut self, ratio: f64) {
        self.pixel_ratio = ratio;
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), String> {
        self.frames += 1;
        if self.fail_on_frame == Some(self.frames) {
            return Err("device lost".to_string());
        }
        self.camera_positions.push(camera.position());
        self.last_vertex_count = RenderList::build(scene).vertex_count();
        Ok(())
    }
}

/// Stats panel whose samples stay observable after it is boxed.
#[derive(Debug, Clone, Default)]
pub struct RecordingPanel {
    pub samples: Rc<RefCell<Vec<StatsSample>>>,
}

impl StatsPanel for RecordingPanel {
    fn show(&mut self, sample: &StatsSample) {
        self.samples.borrow_mut().push(*sample);
    }
}
