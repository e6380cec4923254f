mod contour;
mod density;
mod eval;
mod graph;
mod mesh;
mod node;
mod nodes_builtin;
mod piece;
mod project;
mod registry;
mod scene;
mod serialize;
mod socket;
mod value;

pub use contour::{contour_density, ContourError};
pub use density::{
    build_density_kernel, ComposeError, ComposerState, DensityKernel, DensityShaderBuilder,
    OpenClDensityBuilder, PieceBlock, DENSITY_LIBRARY, TRANSFORM_STRIDE,
};
pub use eval::{
    EvalNodeReport, EvalReport, ExecutionContext, ExecutionMode, GraphVisitor, NodeContext,
};
pub use graph::{EdgeRejection, Graph, GraphError, NodeId, Propagation, SocketId};
pub use mesh::{Aabb, Mesh};
pub use node::{AsAny, Flow, Node, NodeBehavior, SocketBuilder};
pub use nodes_builtin::{
    register_builtins, Arithmetic, ArithmeticOp, Branch, Collect, Compare, CompareOp, Constant,
    Repeat, Sequence,
};
pub use piece::{CsgMode, Piece, PieceShape, Primitive, SegmentChain};
pub use project::{
    ContourSettings, EngineSettings, ExecutionSettings, KernelSettings, Project, PROJECT_VERSION,
};
pub use registry::NodeRegistry;
pub use scene::{HierarchyVisitor, SceneObject, Transform};
pub use serialize::{
    BinaryReader, BinaryWriter, ByteReader, ByteWriter, SerializeError, SocketRecord,
};
pub use socket::{Connection, Socket, SocketDefinition, SocketRole};
pub use value::{SocketValue, TypeMask};
